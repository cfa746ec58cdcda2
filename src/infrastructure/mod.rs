pub mod composite_gateway;
pub mod console_notifier;
pub mod fake_gateway;
pub mod memory_store;
pub mod openweather_gateway;
pub mod sqlite_store;
pub mod telegram_notifier;
pub mod visualcrossing_gateway;
