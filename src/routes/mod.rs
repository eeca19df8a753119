pub mod analysis;
pub mod health;
pub mod logs;
pub mod settings;
