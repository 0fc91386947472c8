pub mod agent;
pub mod cron;
pub mod gateway;
pub mod onboard;
pub mod status;
