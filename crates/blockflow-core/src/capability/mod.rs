//! External collaborators the blocks talk to. The core only defines the contracts;
//! `blockflow-adapters` ships default implementations.

mod db;
mod http;
mod intercept;
mod request;

pub use db::{DbAdapter, DbCondition, DbError, DbMode, DbSort, SortDirection};
pub use http::{HttpClient, HttpError, HttpMethod, HttpResponse};
pub use intercept::{InterceptEvent, Interceptor, RecordingInterceptor};
pub use request::{CookieSpec, RequestData, ResponseState, RouteMeta};

#[cfg(test)]
pub(crate) use db::testing;
