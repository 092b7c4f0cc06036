pub mod flash;
pub mod hx711;
pub mod max6675;
pub mod servo;
