use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use parking_lot::{Condvar, Mutex};

use crate::error::TransportError;

/// 一次写入或关闭的最终结果。
pub type CompletionResult = Result<(), TransportError>;

type Listener = Box<dyn FnOnce(CompletionResult) + Send + 'static>;

enum Slot {
    Pending {
        listener: Option<Listener>,
        waker: Option<Waker>,
    },
    Done(CompletionResult),
}

struct Shared {
    slot: Mutex<Slot>,
    done: Condvar,
}

impl Shared {
    fn complete(&self, result: CompletionResult) {
        let mut slot = self.slot.lock();
        let previous = std::mem::replace(&mut *slot, Slot::Done(result.clone()));
        drop(slot);
        self.done.notify_all();
        if let Slot::Pending { listener, waker } = previous {
            if let Some(waker) = waker {
                waker.wake();
            }
            if let Some(listener) = listener {
                listener(result);
            }
        }
    }
}

/// 端点写入/关闭操作的一次性完成句柄。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - 每个 `Completion` 只会被对应的 [`CompletionNotifier`] 完成一次；
/// - [`Completion::on_complete`] 注册的监听器恰好执行一次：若操作已完成，立即在调用线程执行，
///   否则在完成方（通常是传输层工作线程）上执行；
/// - [`Completion::wait`] 阻塞当前线程直至完成；
/// - 也可以直接 `.await`，三种消费方式互斥（均获取所有权）；
/// - 通知方在完成前被丢弃时，结果为 [`TransportError::Abandoned`]。
///
/// ## 注意事项（Trade-offs）
/// - 监听器运行在完成方线程上，不得阻塞；
/// - 在单线程 Tokio 运行时的工作线程里调用 `wait` 会阻塞负责完成它的线程，应改用 `.await` 或监听器。
pub struct Completion {
    shared: Arc<Shared>,
}

/// [`Completion`] 的写端，由端点实现持有。
pub struct CompletionNotifier {
    shared: Option<Arc<Shared>>,
}

impl Completion {
    /// 创建一对未完成的通知端与完成句柄。
    pub fn pair() -> (CompletionNotifier, Completion) {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::Pending {
                listener: None,
                waker: None,
            }),
            done: Condvar::new(),
        });
        (
            CompletionNotifier {
                shared: Some(Arc::clone(&shared)),
            },
            Completion { shared },
        )
    }

    /// 创建一个已经完成的句柄。
    pub fn ready(result: CompletionResult) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::Done(result)),
                done: Condvar::new(),
            }),
        }
    }

    /// 是否已经完成。
    pub fn is_done(&self) -> bool {
        matches!(*self.shared.slot.lock(), Slot::Done(_))
    }

    /// 注册完成监听器。
    pub fn on_complete<F>(self, listener: F)
    where
        F: FnOnce(CompletionResult) + Send + 'static,
    {
        let mut slot = self.shared.slot.lock();
        match &mut *slot {
            Slot::Done(result) => {
                let result = result.clone();
                drop(slot);
                listener(result);
            }
            Slot::Pending {
                listener: stored, ..
            } => {
                *stored = Some(Box::new(listener));
            }
        }
    }

    /// 阻塞等待完成。
    pub fn wait(self) -> CompletionResult {
        let mut slot = self.shared.slot.lock();
        loop {
            if let Slot::Done(result) = &*slot {
                return result.clone();
            }
            self.shared.done.wait(&mut slot);
        }
    }
}

impl Future for Completion {
    type Output = CompletionResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.shared.slot.lock();
        match &mut *slot {
            Slot::Done(result) => Poll::Ready(result.clone()),
            Slot::Pending { waker, .. } => {
                *waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("done", &self.is_done())
            .finish()
    }
}

impl CompletionNotifier {
    /// 以给定结果完成。
    pub fn complete(mut self, result: CompletionResult) {
        if let Some(shared) = self.shared.take() {
            shared.complete(result);
        }
    }

    /// 以成功完成。
    pub fn succeed(self) {
        self.complete(Ok(()));
    }

    /// 以失败完成。
    pub fn fail(self, error: TransportError) {
        self.complete(Err(error));
    }
}

impl Drop for CompletionNotifier {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.complete(Err(TransportError::Abandoned));
        }
    }
}

impl fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionNotifier")
            .field("armed", &self.shared.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    #[test]
    fn listener_attached_before_completion_runs_once() {
        let (notifier, completion) = Completion::pair();
        let calls = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&calls);
        completion.on_complete(move |result| {
            assert!(result.is_ok());
            observed.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        notifier.succeed();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_attached_after_completion_runs_inline() {
        let completion = Completion::ready(Err(TransportError::Closed));
        let calls = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&calls);
        completion.on_complete(move |result| {
            assert!(matches!(result, Err(TransportError::Closed)));
            observed.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_notifier_resolves_as_abandoned() {
        let (notifier, completion) = Completion::pair();
        drop(notifier);
        assert!(matches!(completion.wait(), Err(TransportError::Abandoned)));
    }

    #[test]
    fn wait_blocks_until_another_thread_completes() {
        let (notifier, completion) = Completion::pair();
        let worker = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(20));
            notifier.succeed();
        });
        assert!(completion.wait().is_ok());
        worker.join().expect("完成线程不应 panic");
    }

    #[test]
    fn completion_can_be_awaited() {
        let (notifier, completion) = Completion::pair();
        let worker = thread::spawn(move || notifier.fail(TransportError::Other("boom".into())));
        let result = futures::executor::block_on(completion);
        worker.join().expect("完成线程不应 panic");
        assert!(matches!(result, Err(TransportError::Other(_))));
    }
}
