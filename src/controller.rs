//! Foreground-aware throttling controller.
//!
//! Holds the bypass set and the single pending-foreground slot, reacts to foreground changes
//! (boost the new foreground process, throttle the one before it), and runs the session-wide
//! sweeps when the feature is switched on or off.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::sync::atomic::Ordering;

use tracing::trace;

use crate::bypass::BypassSet;
use crate::notice::{self, NoticeSink, Severity};
use crate::platform::{Access, Hwnd, Pid, Platform, ThrottleError};
use crate::resolver;
use crate::throttle;


// notices raised while the slot is locked, held back until it is released
type Notices = Vec <(String, Severity)>;

fn err_notice (action:&str, name:&str, err:&ThrottleError) -> (String, Severity) {
    if err.is_expected() {
        (format! ("EcoQoS: {action} skipped (expected) -> {name}:{} .. {err}", err.pid()), Severity::Debug)
    } else {
        (format! ("EcoQoS error {action} {name}:{} -> {err}", err.pid()), Severity::Error)
    }
}



/// Callback the notifier invokes with each newly foregrounded window
pub type FgndCallback = Arc < dyn Fn (Hwnd) + Send + Sync + 'static >;

/// Source of foreground-change notifications (a win-event hook in the real app)
pub trait FocusNotifier : Send + Sync {
    fn subscribe   (&self, on_fgnd:FgndCallback);
    fn unsubscribe (&self);
}


# [ atomic_enum::atomic_enum ]
# [ derive (PartialEq) ]
pub enum FeatureState { Off, On }
// ^^ the atomic_enum crate will generate an AtomicFeatureState for us


# [ derive (Debug, Default, Clone, Eq, PartialEq) ]
/// The process that was boosted last and is owed a throttle on the next transition
pub enum ForegroundSlot {
    # [ default ]
    Idle,
    Pending { pid: Pid, name: String },
}
impl ForegroundSlot {
    pub fn pending_pid (&self) -> Option<Pid> {
        match self { ForegroundSlot::Pending { pid, .. } => Some(*pid), ForegroundSlot::Idle => None }
    }
    pub fn is_idle (&self) -> bool { *self == ForegroundSlot::Idle }
}


# [ derive (Debug, Default, Copy, Clone, Eq, PartialEq) ]
/// Outcome counts of one session sweep
pub struct SweepReport {
    pub adjusted      : usize,
    pub bypassed      : usize,
    pub other_session : usize,
    pub denied        : usize,
    pub failed        : usize,
}



pub struct _Controller <P:Platform, N:FocusNotifier> {
    platform : P,
    notifier : N,
    bypass   : RwLock <Arc <BypassSet>>,
    slot     : Mutex <ForegroundSlot>,
    feature  : AtomicFeatureState,
    sink     : RwLock <Option <NoticeSink>>,
}

pub struct Controller <P:Platform, N:FocusNotifier> ( Arc <_Controller<P,N>> );

impl <P:Platform, N:FocusNotifier> Clone for Controller<P,N> {
    fn clone (&self) -> Self { Controller (self.0.clone()) }
}
impl <P:Platform, N:FocusNotifier> Deref for Controller<P,N> {
    type Target = _Controller<P,N>;
    fn deref (&self) -> &Self::Target { &self.0 }
}




impl <P:Platform + 'static, N:FocusNotifier + 'static> Controller<P,N> {

    pub fn new (platform:P, notifier:N) -> Controller<P,N> {
        Controller ( Arc::new ( _Controller {
            platform,
            notifier,
            bypass   : RwLock::new (Arc::new (BypassSet::default())),
            slot     : Mutex::new (ForegroundSlot::Idle),
            feature  : AtomicFeatureState::new (FeatureState::Off),
            sink     : RwLock::new (None),
        } ) )
    }

    pub fn platform (&self) -> &P { &self.platform }
    pub fn notifier (&self) -> &N { &self.notifier }

    pub fn set_notice_sink (&self, sink:NoticeSink) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn notice (&self, msg:&str, sev:Severity) {
        let sink = self.sink.read().unwrap_or_else(PoisonError::into_inner).clone();
        notice::emit (sink.as_ref(), msg, sev);
    }
    /// Emits notices gathered under the slot lock .. must be called after the lock is released, since sinks may call back in
    fn flush (&self, notices:Notices) {
        notices .into_iter() .for_each (|(msg, sev)| self.notice (&msg, sev));
    }

    // the slot lock doubles as the critical section for transitions and sweeps ..
    // every OS-side effect is idempotent, so a poisoned lock is safe to keep using
    fn lock_slot (&self) -> MutexGuard<ForegroundSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn pending (&self) -> ForegroundSlot { self.lock_slot().clone() }



    /*****  bypass set  ******/

    /// Replaces the bypass set wholesale from a user list (defaults and self-protection are always added back)
    pub fn configure <I, S> (&self, user_list:I)  where I: IntoIterator<Item=S>, S: AsRef<str> {
        let set = Arc::new (BypassSet::from_user_list (user_list));
        let n = set.len();
        *self.bypass.write().unwrap_or_else(PoisonError::into_inner) = set;
        self.notice (&format! ("EcoQoS: bypass list updated ({n} entries)"), Severity::Info);
    }

    pub fn bypass_set (&self) -> Arc<BypassSet> {
        self.bypass.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn contains (&self, name:&str) -> bool {
        self.bypass_set().contains(name)
    }



    /*****  foreground transitions  ******/

    /// Handles one foreground change : boost the new foreground process, then throttle the previously boosted one.
    pub fn on_foreground_changed (&self, hwnd:Hwnd) {
        let mut notices = Notices::new();
        self.transition (hwnd, &mut notices);
        self.flush (notices);
    }

    fn transition (&self, hwnd:Hwnd, notices:&mut Notices) {
        let mut slot = self.lock_slot();

        let Some(fg) = resolver::resolve_foreground (&self.platform, hwnd) else { return };
        let bypass = !fg.name.is_empty() && self.contains (&fg.name);

        if !bypass {
            notices.push ( match throttle::set_throttled (&self.platform, &fg.handle, false) {
                Ok(())  => (format! ("EcoQoS: boost -> {}:{}", fg.name, fg.pid), Severity::Debug),
                Err(e)  => err_notice ("boost", &fg.name, &e),
            } );
        }

        if let ForegroundSlot::Pending { pid, name } = std::mem::take (&mut *slot) {
            // re-focusing the same process (another of its windows) must not throttle it
            if pid != fg.pid { notices.push (self.throttle_prev (pid, &name)) }
        }

        if !bypass {
            *slot = ForegroundSlot::Pending { pid: fg.pid, name: fg.name.clone() };
        } else {
            trace! ("fgnd {}:{} is bypassed .. slot left idle", fg.name, fg.pid);
        }
        // fg handle is released here, after the slot is settled
    }

    fn throttle_prev (&self, pid:Pid, name:&str) -> (String, Severity) {
        let res = self.platform.open_process (pid, Access::SetOnly)
            .and_then (|h| throttle::set_throttled (&self.platform, &h, true));
        match res {
            Ok(())  => (format! ("EcoQoS: throttle -> {name}:{pid}"), Severity::Info),
            Err(e)  => err_notice ("throttle", name, &e),
        }
    }



    /*****  session sweeps  ******/

    /// Throttles every process in our session except the pending foreground one and the bypassed ones
    pub fn throttle_all_background (&self) -> SweepReport {
        let mut notices = Notices::new();
        let slot = self.lock_slot();
        let report = self.sweep (true, slot.pending_pid(), &mut notices);
        drop(slot);
        self.flush (notices);
        self.notice (&format! ("EcoQoS: throttle sweep done .. {report:?}"), Severity::Info);
        report
    }

    /// Removes throttling from every non-bypassed process in our session, and resets the pending slot
    pub fn unthrottle_all_user_processes (&self) -> SweepReport {
        let mut notices = Notices::new();
        let mut slot = self.lock_slot();
        let report = self.sweep (false, None, &mut notices);
        *slot = ForegroundSlot::Idle;
        drop(slot);
        self.flush (notices);
        self.notice (&format! ("EcoQoS: restore sweep done .. {report:?}"), Severity::Info);
        report
    }

    fn sweep (&self, enable:bool, keep_pid:Option<Pid>, notices:&mut Notices) -> SweepReport {
        let mut report = SweepReport::default();
        let Some(session) = self.platform.current_session_id() else {
            notices.push (("EcoQoS: could not determine own session .. sweep skipped".to_string(), Severity::Warn));
            return report
        };
        let bypass = self.bypass_set();
        let action = if enable { "throttle" } else { "unthrottle" };

        for p in self.platform.processes() {
            if p.session_id != Some(session) { report.other_session += 1; continue }
            if Some(p.pid) == keep_pid { continue }
            if bypass.contains (&p.name) { report.bypassed += 1; continue }

            let res = self.platform.open_process (p.pid, Access::SetOnly)
                .and_then (|h| throttle::set_throttled (&self.platform, &h, enable));
            match res {
                Ok(()) => {
                    report.adjusted += 1;
                    notices.push ((format! ("EcoQoS: {action} -> {}:{}", p.name, p.pid), if enable {Severity::Info} else {Severity::Debug}));
                }
                Err(e) => {
                    if e.is_expected() { report.denied += 1 } else { report.failed += 1 }
                    notices.push (err_notice (action, &p.name, &e));
                }
            }
        }
        report
    }



    /*****  feature toggle  ******/

    pub fn feature_state (&self) -> FeatureState { self.feature.load (Ordering::SeqCst) }
    pub fn is_enabled (&self) -> bool { self.feature_state() == FeatureState::On }

    /// Subscribes to foreground changes (if not already) and throttles everything in the background
    pub fn enable_feature (&self) -> SweepReport {
        if self.feature.swap (FeatureState::On, Ordering::SeqCst) == FeatureState::Off {
            let weak = Arc::downgrade (&self.0);
            self.notifier.subscribe ( Arc::new ( move |hwnd| {
                if let Some(ctl) = weak.upgrade() { Controller(ctl).on_foreground_changed(hwnd) }
            } ) );
            self.notice ("=== ECO ON ===", Severity::Info);
        }
        self.throttle_all_background()
    }

    /// Unsubscribes (if subscribed) and restores every process .. always runs the full restore, whatever the prior state
    pub fn disable_feature (&self) -> SweepReport {
        if self.feature.swap (FeatureState::Off, Ordering::SeqCst) == FeatureState::On {
            self.notifier.unsubscribe();
            self.notice ("=== ECO OFF ===", Severity::Info);
        }
        self.unthrottle_all_user_processes()
    }

}
