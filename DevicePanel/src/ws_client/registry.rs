// DevicePanel/src/ws_client/registry.rs

//! 监听器注册表：按 `(event, action)` 标签把入站负载分发给订阅者。
//!
//! - 同一标签可注册多个监听器 (包括同一回调的重复注册)，按注册顺序调用。
//! - `once` 注册在第一次分发时即从槽位中移除，保证最多被调用一次。
//! - 分发时先在锁内取回调快照、再在锁外调用，回调内部可以安全地注册或移除监听器。
//! - 没有订阅者的标签直接丢弃，这不是错误。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::trace;
use rust_websocket_utils::message::{Payload, Tag};

/// 监听回调。
pub type ListenerCallback = Arc<dyn Fn(&Payload) + Send + Sync>;

/// 注册表内唯一的监听器标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    callback: ListenerCallback,
    once: bool,
}

/// 标签到回调列表的映射。
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    slots: Mutex<HashMap<Tag, Vec<Registration>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Tag, Vec<Registration>>> {
        // 回调从不在锁内执行，中毒只可能来自本模块自身的 panic，直接沿用内部数据
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, tag: Tag, callback: ListenerCallback, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        trace!("[监听注册表] 注册 {} 的监听器 {:?} (once: {})", tag, id, once);
        self.slots()
            .entry(tag)
            .or_default()
            .push(Registration { id, callback, once });
        id
    }

    /// 追加一个持久监听器。
    pub fn add(&self, tag: Tag, callback: ListenerCallback) -> ListenerId {
        self.insert(tag, callback, false)
    }

    /// 追加一个一次性监听器。
    pub fn add_once(&self, tag: Tag, callback: ListenerCallback) -> ListenerId {
        self.insert(tag, callback, true)
    }

    /// 移除指定监听器；不存在时返回 `false`。
    pub fn remove(&self, tag: &Tag, id: ListenerId) -> bool {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(tag) else {
            return false;
        };
        let Some(position) = slot.iter().position(|r| r.id == id) else {
            return false;
        };
        slot.remove(position);
        if slot.is_empty() {
            slots.remove(tag);
        }
        trace!("[监听注册表] 已移除 {} 的监听器 {:?}", tag, id);
        true
    }

    /// 某个标签上当前注册的监听器数量。
    pub fn listener_count(&self, tag: &Tag) -> usize {
        self.slots().get(tag).map_or(0, Vec::len)
    }

    /// 所有标签上的监听器总数。
    pub fn total_listeners(&self) -> usize {
        self.slots().values().map(Vec::len).sum()
    }

    /// 把负载分发给该标签的全部监听器，返回被调用的回调数量。
    pub fn dispatch(&self, tag: &Tag, payload: &Payload) -> usize {
        let snapshot: Vec<ListenerCallback> = {
            let mut slots = self.slots();
            let Some(slot) = slots.get_mut(tag) else {
                trace!("[监听注册表] 标签 {} 没有订阅者，帧被丢弃", tag);
                return 0;
            };
            let callbacks = slot.iter().map(|r| r.callback.clone()).collect();
            slot.retain(|r| !r.once);
            if slot.is_empty() {
                slots.remove(tag);
            }
            callbacks
        };
        for callback in &snapshot {
            callback(payload);
        }
        snapshot.len()
    }
}

/// 离开作用域时自动移除对应注册的句柄。
#[must_use = "ListenerGuard 被丢弃时监听器会立即被移除"]
pub struct ListenerGuard {
    registry: Arc<ListenerRegistry>,
    tag: Tag,
    id: ListenerId,
    armed: bool,
}

impl ListenerGuard {
    pub(crate) fn new(registry: Arc<ListenerRegistry>, tag: Tag, id: ListenerId) -> Self {
        Self {
            registry,
            tag,
            id,
            armed: true,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// 立即移除监听器，返回它是否仍处于注册状态。
    pub fn remove(mut self) -> bool {
        self.armed = false;
        self.registry.remove(&self.tag, self.id)
    }

    /// 放弃自动移除，监听器将一直保留直到被显式移除。
    pub fn detach(mut self) -> ListenerId {
        self.armed = false;
        self.id
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if self.armed {
            self.registry.remove(&self.tag, self.id);
        }
    }
}
