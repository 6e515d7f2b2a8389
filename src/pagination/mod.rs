pub mod connection;
pub mod cursor;

pub use connection::{
    paginate, Connection, ConnectionArgs, ConnectionSource, Direction, Edge, PageInfo,
};
pub use cursor::SortKey;
