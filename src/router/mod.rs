//! Route matching, the route table and request dispatch.

mod dispatcher;
mod filter;
mod pattern;
mod table;

pub use dispatcher::Dispatcher;
pub use filter::{RouteFilter, RouteSpec};
pub use pattern::{join_paths, RoutePattern};
pub(crate) use table::build_routes;
pub use table::RouteEntry;
