use crate::domain::model::ExistingBooking;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

/// 整個執行期間共享的預約狀態
///
/// `holding` 與 `booked` 只會由 false 變成 true 一次，且 `booked ⇒ holding`。
#[derive(Debug, Default)]
pub struct ReservationState {
    holding: AtomicBool,
    booked: AtomicBool,
    existing_booking: Mutex<Option<ExistingBooking>>,
}

impl ReservationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_holding(&self) -> bool {
        self.holding.load(Ordering::SeqCst)
    }

    pub fn is_booked(&self) -> bool {
        self.booked.load(Ordering::SeqCst)
    }

    /// 回傳是否由這次呼叫完成 false → true
    pub fn mark_holding(&self) -> bool {
        self.holding
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// 尚未 holding 時不會標記
    pub fn mark_booked(&self) -> bool {
        if !self.is_holding() {
            return false;
        }
        self.booked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// 暫存既有預約，等到保留新時段前再取消
    pub fn stage_existing(&self, booking: ExistingBooking) {
        *self
            .existing_booking
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(booking);
    }

    pub fn existing(&self) -> Option<ExistingBooking> {
        self.existing_booking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take_existing(&self) -> Option<ExistingBooking> {
        self.existing_booking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// 輪詢佇列的派工開關：暫停時不再派出新工作，進行中的工作照常完成
#[derive(Debug)]
pub struct DispatchGate {
    paused: watch::Sender<bool>,
}

impl Default for DispatchGate {
    fn default() -> Self {
        let (paused, _) = watch::channel(false);
        Self { paused }
    }
}

impl DispatchGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Running → Paused；已經暫停時回傳 false
    pub fn pause(&self) -> bool {
        self.paused.send_if_modified(|paused| {
            if *paused {
                false
            } else {
                *paused = true;
                true
            }
        })
    }

    /// Paused → Running；本來就在執行時回傳 false
    pub fn resume(&self) -> bool {
        self.paused.send_if_modified(|paused| {
            if *paused {
                *paused = false;
                true
            } else {
                false
            }
        })
    }

    pub async fn wait_until_running(&self) {
        let mut receiver = self.paused.subscribe();
        let _ = receiver.wait_for(|paused| !*paused).await;
    }
}

/// 由 Orchestrator 建立並明確傳給佇列與預約流程的執行上下文
#[derive(Debug, Default)]
pub struct RunContext {
    pub state: ReservationState,
    pub gate: DispatchGate,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }
}
