pub mod ask;
pub mod bulk;
pub mod extract;
pub mod health;
