pub mod health;
pub mod prices;
pub mod ticks;
pub mod watches;
