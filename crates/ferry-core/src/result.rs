use std::fmt;

use crate::{channel::Channel, endpoint::Endpoint, error::ChannelError};

/// 一次带回调发送的最终结果，交付给 [`Channel::send_with`] 的回调。
///
/// 结果不可变：只能由通道构造，对外仅提供只读访问。
pub struct SendResult<E: Endpoint> {
    cause: Option<ChannelError>,
    channel: Channel<E>,
    message: E::Message,
}

impl<E: Endpoint> SendResult<E> {
    pub(crate) fn succeeded(channel: Channel<E>, message: E::Message) -> Self {
        Self {
            cause: None,
            channel,
            message,
        }
    }

    pub(crate) fn failed(channel: Channel<E>, message: E::Message, cause: ChannelError) -> Self {
        Self {
            cause: Some(cause),
            channel,
            message,
        }
    }

    pub fn is_success(&self) -> bool {
        self.cause.is_none()
    }

    /// 失败原因；成功时为 `None`。
    pub fn cause(&self) -> Option<&ChannelError> {
        self.cause.as_ref()
    }

    /// 产生该结果的通道。
    pub fn channel(&self) -> &Channel<E> {
        &self.channel
    }

    /// 被发送的原始消息。
    pub fn message(&self) -> &E::Message {
        &self.message
    }

    /// 取回原始消息，常用于调用方换一条通道重发。
    pub fn into_message(self) -> E::Message {
        self.message
    }
}

impl<E> fmt::Debug for SendResult<E>
where
    E: Endpoint,
    E::Message: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendResult")
            .field("success", &self.is_success())
            .field("cause", &self.cause)
            .field("channel", &self.channel.id())
            .field("message", &self.message)
            .finish()
    }
}

/// 一次异步关闭的最终结果，交付给 [`Channel::close_with`] 的回调。
pub struct AsyncResult<E: Endpoint> {
    cause: Option<ChannelError>,
    channel: Channel<E>,
}

impl<E: Endpoint> AsyncResult<E> {
    pub(crate) fn succeeded(channel: Channel<E>) -> Self {
        Self {
            cause: None,
            channel,
        }
    }

    pub(crate) fn failed(channel: Channel<E>, cause: ChannelError) -> Self {
        Self {
            cause: Some(cause),
            channel,
        }
    }

    pub fn is_success(&self) -> bool {
        self.cause.is_none()
    }

    pub fn cause(&self) -> Option<&ChannelError> {
        self.cause.as_ref()
    }

    pub fn channel(&self) -> &Channel<E> {
        &self.channel
    }
}

impl<E: Endpoint> fmt::Debug for AsyncResult<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult")
            .field("success", &self.is_success())
            .field("cause", &self.cause)
            .field("channel", &self.channel.id())
            .finish()
    }
}
