use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::{attribute::AttributeStore, channel::Role, error::SessionError};

/// 会话标识。
pub type SessionId = u32;

/// 一次协议会话的状态。
///
/// 会话自带独立的 [`AttributeStore`]，协议扩展把协商结果（序列化方式、压缩算法等）挂在这里。
pub struct Session {
    id: SessionId,
    created_at: Instant,
    // 相对 `created_at` 的纳秒偏移。
    last_access: AtomicU64,
    attributes: AttributeStore,
}

impl Session {
    /// 以给定 ID 创建会话。
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            last_access: AtomicU64::new(0),
            attributes: AttributeStore::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    /// 记录一次访问。
    pub fn touch(&self) {
        let elapsed = u64::try_from(self.created_at.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.last_access.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// 最近一次访问的时刻。
    pub fn last_access(&self) -> Instant {
        self.created_at + Duration::from_nanos(self.last_access.load(Ordering::Relaxed))
    }

    /// 截至 `now` 的空闲时长；`now` 早于最近访问时为零。
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// 通道级、区分角色的会话注册表。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - **服务端**：[`SessionManager::create`] 由本端分配 ID 并登记；对端携带的 ID 只能经
///   [`SessionManager::validate`] 校验，不允许对端自行创建；
/// - **客户端**：[`SessionManager::get_or_request`] 返回当前会话，缺失时调用协商闭包向对端申请；
///   并发调用方最终收敛到同一个胜者（至少一次协商、至多一个可见胜者），败者的协商结果被丢弃；
/// - 角色不符的调用返回 [`SessionError::Role`]，不修改任何状态；
/// - 两种角色都可以 `get` / `remove` / `remove_idle`。
///
/// ## 逻辑（How）
/// - 会话表为 `DashMap`；客户端“当前会话”使用 `ArcSwapOption`，安装步骤是一次
///   “仍为空才替换”的比较交换。
pub struct SessionManager {
    role: Role,
    next_id: AtomicU32,
    sessions: DashMap<SessionId, Arc<Session>>,
    current: ArcSwapOption<Session>,
}

impl SessionManager {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            next_id: AtomicU32::new(0),
            sessions: DashMap::new(),
            current: ArcSwapOption::empty(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn require(&self, role: Role, operation: &'static str) -> Result<(), SessionError> {
        if self.role == role {
            Ok(())
        } else {
            Err(SessionError::Role {
                role: self.role,
                operation,
            })
        }
    }

    /// 服务端：分配 ID 并登记新会话。
    pub fn create(&self) -> Result<Arc<Session>, SessionError> {
        self.require(Role::Server, "create")?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let session = Arc::new(Session::new(id));
        self.install(Arc::clone(&session));
        debug!(session = id, "server session created");
        Ok(session)
    }

    /// 登记会话；ID 回绕后与仍存活的会话冲突时，新会话替换旧会话并记录告警。
    fn install(&self, session: Arc<Session>) {
        let id = session.id();
        if let Some(replaced) = self.sessions.insert(id, session) {
            warn!(
                session = id,
                role = %self.role,
                idle = ?replaced.idle_for(Instant::now()),
                "session id collided with a live session after wraparound; replacing it"
            );
        }
    }

    /// 服务端：校验对端声明的会话 ID，成功时刷新访问时间。
    pub fn validate(&self, id: SessionId) -> Result<Arc<Session>, SessionError> {
        self.require(Role::Server, "validate")?;
        let session = self.get(id).ok_or(SessionError::Unknown { id })?;
        session.touch();
        Ok(session)
    }

    /// 客户端：返回当前会话，缺失时经 `negotiate` 向对端申请并缓存。
    pub fn get_or_request<F>(&self, negotiate: F) -> Result<Arc<Session>, SessionError>
    where
        F: FnOnce() -> Result<SessionId, SessionError>,
    {
        self.require(Role::Client, "get_or_request")?;
        if let Some(current) = self.current.load_full() {
            current.touch();
            return Ok(current);
        }
        let candidate = Arc::new(Session::new(negotiate()?));
        let previous = self
            .current
            .compare_and_swap(&None::<Arc<Session>>, Some(Arc::clone(&candidate)));
        match &*previous {
            Some(winner) => {
                trace!(
                    session = winner.id(),
                    discarded = candidate.id(),
                    "concurrent negotiation lost; using the installed session"
                );
                Ok(Arc::clone(winner))
            }
            None => {
                self.install(Arc::clone(&candidate));
                debug!(session = candidate.id(), "client session negotiated");
                Ok(candidate)
            }
        }
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|slot| Arc::clone(slot.value()))
    }

    /// 移除会话；若它是客户端当前会话，同时清空当前会话。
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(&id).map(|(_, session)| session);
        let current = self.current.load_full();
        if let Some(session) = current.as_ref()
            && session.id() == id
        {
            self.current.compare_and_swap(&current, None::<Arc<Session>>);
        }
        removed
    }

    /// 移除空闲超过 `max_idle` 的会话，返回移除数量。
    pub fn remove_idle(&self, now: Instant, max_idle: Duration) -> usize {
        let idle: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|slot| slot.value().idle_for(now) > max_idle)
            .map(|slot| *slot.key())
            .collect();
        let removed = idle
            .into_iter()
            .filter(|id| self.remove(*id).is_some())
            .count();
        if removed > 0 {
            debug!(removed, role = %self.role, "idle sessions evicted");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("role", &self.role)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn colliding_session_id_replaces_the_live_session() {
        let manager = SessionManager::new(Role::Server);
        let older = Arc::new(Session::new(u32::MAX));
        manager.install(Arc::clone(&older));
        let newer = Arc::new(Session::new(u32::MAX));
        manager.install(Arc::clone(&newer));

        assert_eq!(manager.len(), 1);
        let installed = manager.get(u32::MAX).expect("冲突后仍有一个会话");
        assert!(Arc::ptr_eq(&installed, &newer));
        assert!(logs_contain("session id collided with a live session"));
    }

    #[test]
    fn server_ids_wrap_past_the_maximum() {
        let manager = SessionManager::new(Role::Server);
        manager.next_id.store(u32::MAX - 1, Ordering::Relaxed);
        assert_eq!(manager.create().expect("创建").id(), u32::MAX);
        assert_eq!(manager.create().expect("回绕后继续创建").id(), 0);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn server_creates_and_validates() {
        let manager = SessionManager::new(Role::Server);
        let session = manager.create().expect("服务端可以创建会话");
        assert_eq!(session.id(), 1);
        let validated = manager.validate(1).expect("已登记的会话应通过校验");
        assert!(Arc::ptr_eq(&session, &validated));
        assert_eq!(
            manager.validate(42).unwrap_err(),
            SessionError::Unknown { id: 42 }
        );
    }

    #[test]
    fn role_violations_are_rejected() {
        let server = SessionManager::new(Role::Server);
        let client = SessionManager::new(Role::Client);
        assert!(matches!(
            server.get_or_request(|| Ok(1)),
            Err(SessionError::Role { role: Role::Server, .. })
        ));
        assert!(matches!(
            client.create(),
            Err(SessionError::Role { role: Role::Client, .. })
        ));
        assert!(client.is_empty());
    }

    #[test]
    fn client_negotiates_once_and_caches() {
        let manager = SessionManager::new(Role::Client);
        let first = manager.get_or_request(|| Ok(7)).expect("协商成功");
        let second = manager
            .get_or_request(|| panic!("已有当前会话时不应再次协商"))
            .expect("命中缓存");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn rejected_negotiation_leaves_no_session() {
        let manager = SessionManager::new(Role::Client);
        let err = manager
            .get_or_request(|| {
                Err(SessionError::Rejected {
                    reason: "unsupported".into(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::Rejected { .. }));
        assert!(manager.is_empty());
        assert!(manager.get_or_request(|| Ok(3)).is_ok());
    }

    #[test]
    fn removing_current_session_forces_renegotiation() {
        let manager = SessionManager::new(Role::Client);
        let first = manager.get_or_request(|| Ok(1)).expect("协商成功");
        assert!(manager.remove(first.id()).is_some());
        let second = manager.get_or_request(|| Ok(2)).expect("重新协商");
        assert_eq!(second.id(), 2);
    }

    #[test]
    fn idle_sessions_are_evicted() {
        let manager = SessionManager::new(Role::Server);
        let stale = manager.create().expect("创建");
        let fresh = manager.create().expect("创建");
        let later = Instant::now() + Duration::from_secs(60);
        fresh.touch();
        let evicted = manager.remove_idle(later, Duration::from_secs(30));
        assert_eq!(evicted, 2, "两个会话在 60 秒后都已空闲超过 30 秒");
        assert!(manager.get(stale.id()).is_none());
        assert_eq!(manager.remove_idle(Instant::now(), Duration::from_secs(30)), 0);
    }
}
