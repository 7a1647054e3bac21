pub mod api;
pub mod config;
pub mod error;
pub mod fanout;
pub mod session;
pub mod transport;
pub mod utils;

pub use api::DevPortalApi;
pub use error::{ApiError, ApiResult, ErrorKind};
pub use fanout::{map_bounded, map_bounded_cancellable, Cancelled};
pub use session::{Credentials, Identity, RenewalPolicy, Role, SessionStore, SessionedClient};
pub use transport::{HttpTransport, RequestBody, RequestDescriptor, ResponseBody, Transport};
