use std::io;

use ferry_core::TransportError;
use tracing::debug;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const BIND: OperationKind = OperationKind {
    code: "ferry.transport.tcp.bind_failed",
    message: "tcp bind",
};
pub(crate) const ACCEPT: OperationKind = OperationKind {
    code: "ferry.transport.tcp.accept_failed",
    message: "tcp accept",
};
pub(crate) const CONNECT: OperationKind = OperationKind {
    code: "ferry.transport.tcp.connect_failed",
    message: "tcp connect",
};
pub(crate) const READ: OperationKind = OperationKind {
    code: "ferry.transport.tcp.read_failed",
    message: "tcp read",
};
pub(crate) const WRITE: OperationKind = OperationKind {
    code: "ferry.transport.tcp.write_failed",
    message: "tcp write",
};
pub(crate) const SHUTDOWN: OperationKind = OperationKind {
    code: "ferry.transport.tcp.shutdown_failed",
    message: "tcp shutdown",
};
pub(crate) const CONFIGURE: OperationKind = OperationKind {
    code: "ferry.transport.tcp.configure_failed",
    message: "tcp configure",
};

/// 将 IO 错误映射为传输错误，并以稳定错误码记录一条调试日志。
pub(crate) fn map_io_error(kind: OperationKind, error: io::Error) -> TransportError {
    debug!(code = kind.code, error = %error, "{}", kind.message);
    TransportError::io(kind.message, error)
}

/// 对端主动断开一类的错误，读写任务遇到时按正常关闭处理，不上报异常。
pub(crate) fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}
