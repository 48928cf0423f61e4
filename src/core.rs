pub mod anchor;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod record;
pub mod schema;
pub mod strategy;
pub mod traits;

pub use self::anchor::*;
pub use self::buffer::*;
pub use self::config::*;
pub use self::connection::*;
pub use self::coordinator::*;
pub use self::error::*;
pub use self::events::*;
pub use self::record::*;
pub use self::schema::*;
pub use self::strategy::*;
pub use self::traits::*;
