use crate::driver::EngineHandle;
use crate::ipc::Inbound;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Which engine receives messages from the tray process.
/// Owned by the process entry point and handed to the channel reader.
#[derive(Default)]
pub struct SessionRegistry {
    active: Mutex<Option<EngineHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot holds only a handle, so a poisoned lock is still consistent.
    fn slot(&self) -> MutexGuard<'_, Option<EngineHandle>> {
        self.active.lock().unwrap_or_else(|e| {
            warn!("[IPC] Registry mutex poisoned, recovering: {}", e);
            e.into_inner()
        })
    }

    /// Make `handle` the routing target; returns the one it replaces.
    pub fn register(&self, handle: EngineHandle) -> Option<EngineHandle> {
        self.slot().replace(handle)
    }

    pub fn unregister(&self) -> Option<EngineHandle> {
        self.slot().take()
    }

    pub fn active(&self) -> Option<EngineHandle> {
        self.slot().clone()
    }

    /// Deliver to the active engine. With no session the message is dropped.
    pub fn route(&self, msg: Inbound) -> bool {
        match self.active() {
            Some(handle) => handle.inbound(msg),
            None => {
                debug!("[IPC] No active session, dropping {:?}", msg);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Command;
    use std::sync::Arc;

    #[test]
    fn test_poisoned_registry_keeps_routing() {
        let registry = Arc::new(SessionRegistry::new());
        let (handle, mut rx) = EngineHandle::detached();
        registry.register(handle);

        let r = registry.clone();
        let _ = std::thread::spawn(move || {
            let _slot = r.active.lock().unwrap();
            panic!("panic while holding the registry lock");
        })
        .join();
        assert!(registry.active.is_poisoned());

        assert!(registry.active().is_some());
        assert!(registry.route(Inbound::Activity));
        assert!(matches!(
            rx.try_recv(),
            Ok(Command::Inbound(Inbound::Activity))
        ));

        assert!(registry.unregister().is_some());
        assert!(registry.active().is_none());
        let (other, _rx) = EngineHandle::detached();
        assert!(registry.register(other).is_none());
        assert!(registry.active().is_some());
    }
}
