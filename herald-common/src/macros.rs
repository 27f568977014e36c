#[macro_export]
macro_rules! ok_or_break {
    ($expression:expr) => {
        match $expression {
            Ok(v) => v,
            Err(_) => break,
        }
    };
}

#[macro_export]
macro_rules! ok_or_continue {
    ($expression:expr) => {
        match $expression {
            Ok(v) => v,
            Err(_) => continue,
        }
    };
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the directive passed in (usually `config.logging.level`).
#[macro_export]
macro_rules! tracing_init {
    ($level:expr) => {{
        $crate::macros::init_subscriber($level)
    }};
    () => {{
        $crate::macros::init_subscriber("info")
    }};
}

pub fn init_subscriber(default_directive: &str) {
    use time::macros::format_description;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt::time::UtcTime;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let timer = UtcTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    // a subscriber may already be installed (e.g. when called twice from tests)
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .try_init()
        .is_ok()
    {
        tracing::debug!("logging initialised, default directive {default_directive}");
    }
}
