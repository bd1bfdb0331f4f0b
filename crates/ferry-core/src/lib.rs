#![deny(unsafe_code)]
#![doc = "ferry-core: RPC 连接层核心契约。"]
#![doc = ""]
#![doc = "把一条原始双工连接（[`Endpoint`]）包装为可并发使用的 [`Channel`]：发送带类型的消息、"]
#![doc = "以请求 ID 关联异步回复（[`FutureManager`]）、暴露存活与背压状态，并在多线程并发下干净地关闭。"]
#![doc = ""]
#![doc = "核心不实现排队、重试与退避，只负责把失败分类得足够精确，由调用方决定后续动作。"]

pub mod attribute;
pub mod channel;
pub mod completion;
pub mod endpoint;
pub mod error;
pub mod extension;
pub mod future;
pub mod ids;
pub mod prelude;
pub mod result;
pub mod session;
mod sync;
pub mod test_stubs;

pub use attribute::{AttributeStore, AttributeValue};
pub use channel::{Channel, Role};
pub use completion::{Completion, CompletionNotifier, CompletionResult};
pub use endpoint::{DEFAULT_BUFFER_CAPACITY, Endpoint};
pub use error::{ChannelError, ErrorKind, SessionError, TransportError, codes};
pub use extension::ExtensionRegistry;
pub use future::{FutureManager, ReplyFuture, ReplyResult};
pub use ids::{IdGenerator, MessageId};
pub use result::{AsyncResult, SendResult};
pub use session::{Session, SessionId, SessionManager};
