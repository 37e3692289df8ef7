pub mod clock;
pub mod config;
pub mod emitter;
pub mod error;
pub mod history_counter;
pub mod host_api;
pub mod id;
pub mod ipc;
pub mod logger;
pub mod normalize;
pub mod pending;
pub mod protocol;
pub mod server;
pub mod transport;

pub use emitter::{Disposable, EventEmitter};
pub use error::{HostApiError, RequestError};
pub use host_api::{HostApi, ResponseFuture, SendOptions};
pub use id::{CorrelationId, next_id};
pub use protocol::{Envelope, NotificationType, RequestType};
pub use server::Server;
pub use transport::{IpcHost, find_host, provide_host_factory};
