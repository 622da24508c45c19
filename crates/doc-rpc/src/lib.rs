pub mod dispatcher;
pub mod error;
pub mod protocol;

pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use protocol::{RpcError, RpcRequest, RpcResponse};
