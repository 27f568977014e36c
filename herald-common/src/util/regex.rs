use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    pub static ref USER_MENTION: Regex = Regex::new(r"^<@!?(\d{1,20})>").unwrap();
    pub static ref TIME_STRING: Regex = Regex::new("(\\d+)([smhd])").unwrap();
    pub static ref FULL_TIME_STRING: Regex = Regex::new("^(?:\\d+[smhd])+$").unwrap();
}
