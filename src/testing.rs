//! In-memory platform used by the unit tests

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::controller::{FgndCallback, FocusNotifier};
use crate::platform::{Access, Hwnd, Pid, Platform, ProcessEntry, ThrottleError};
use crate::throttle::{PriorityClass, ThrottleDescriptor};


#[derive(Debug, Clone)]
pub struct FakeProc {
    pub pid: Pid,
    pub name: String,
    pub session: Option<u32>,
    pub protected: bool,
    pub reject_throttle: bool,
    pub throttled: Option<bool>,
    pub priority: Option<PriorityClass>,
}

impl FakeProc {
    pub fn new(pid: Pid, name: &str, session: u32) -> FakeProc {
        FakeProc {
            pid,
            name: name.to_string(),
            session: Some(session),
            protected: false,
            reject_throttle: false,
            throttled: None,
            priority: None,
        }
    }
    /// Opening it fails with access-denied
    pub fn protected(mut self) -> FakeProc {
        self.protected = true;
        self
    }
    /// Opens fine, but the throttling call fails with an unexpected error
    pub fn rejecting_throttle(mut self) -> FakeProc {
        self.reject_throttle = true;
        self
    }
}

#[derive(Default)]
struct FakeState {
    procs: BTreeMap<Pid, FakeProc>,
    windows: HashMap<Hwnd, Pid>,
    children: HashMap<Hwnd, Vec<Hwnd>>,
    session: Option<u32>,
    opens: Vec<(Pid, Access)>,
}

pub struct FakePlatform {
    state: Mutex<FakeState>,
    live_handles: Arc<AtomicUsize>,
}

pub struct FakeHandle {
    pid: Pid,
    live: Arc<AtomicUsize>,
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakePlatform {
    pub fn new(session: u32) -> FakePlatform {
        FakePlatform {
            state: Mutex::new(FakeState { session: Some(session), ..Default::default() }),
            live_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn add_proc(&self, p: FakeProc) {
        self.state.lock().unwrap().procs.insert(p.pid, p);
    }
    pub fn add_window(&self, hwnd: Hwnd, pid: Pid) {
        self.state.lock().unwrap().windows.insert(hwnd, pid);
    }
    pub fn add_child_window(&self, parent: Hwnd, child: Hwnd, pid: Pid) {
        let mut st = self.state.lock().unwrap();
        st.windows.insert(child, pid);
        st.children.entry(parent).or_default().push(child);
    }
    pub fn kill(&self, pid: Pid) {
        self.state.lock().unwrap().procs.remove(&pid);
    }
    pub fn set_session(&self, session: Option<u32>) {
        self.state.lock().unwrap().session = session;
    }

    pub fn throttled(&self, pid: Pid) -> Option<bool> {
        self.state.lock().unwrap().procs.get(&pid).and_then(|p| p.throttled)
    }
    pub fn priority(&self, pid: Pid) -> Option<PriorityClass> {
        self.state.lock().unwrap().procs.get(&pid).and_then(|p| p.priority)
    }
    /// Pids currently carrying the throttle flag
    pub fn throttled_pids(&self) -> Vec<Pid> {
        let st = self.state.lock().unwrap();
        st.procs.values().filter(|p| p.throttled == Some(true)).map(|p| p.pid).collect()
    }
    /// Pids that have ever had their throttle state written
    pub fn touched_pids(&self) -> Vec<Pid> {
        let st = self.state.lock().unwrap();
        st.procs.values().filter(|p| p.throttled.is_some() || p.priority.is_some()).map(|p| p.pid).collect()
    }
    pub fn opens(&self) -> Vec<(Pid, Access)> {
        self.state.lock().unwrap().opens.clone()
    }
    pub fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }
}

impl Platform for FakePlatform {
    type Handle = FakeHandle;

    fn window_process_id(&self, hwnd: Hwnd) -> Option<Pid> {
        self.state.lock().unwrap().windows.get(&hwnd).copied().filter(|&pid| pid != 0)
    }

    fn open_process(&self, pid: Pid, access: Access) -> Result<FakeHandle, ThrottleError> {
        let mut st = self.state.lock().unwrap();
        st.opens.push((pid, access));
        match st.procs.get(&pid) {
            None => Err(ThrottleError::ProcessGone { pid }),
            Some(p) if p.protected => Err(ThrottleError::AccessDenied { pid }),
            Some(_) => {
                self.live_handles.fetch_add(1, Ordering::SeqCst);
                Ok(FakeHandle { pid, live: self.live_handles.clone() })
            }
        }
    }

    fn process_image_path(&self, handle: &FakeHandle) -> Option<String> {
        let st = self.state.lock().unwrap();
        st.procs.get(&handle.pid).map(|p| format!(r"C:\Apps\{}", p.name))
    }

    fn child_windows(&self, hwnd: Hwnd) -> Vec<Hwnd> {
        self.state.lock().unwrap().children.get(&hwnd).cloned().unwrap_or_default()
    }

    fn set_power_throttling(&self, handle: &FakeHandle, desc: &ThrottleDescriptor) -> Result<(), ThrottleError> {
        let mut st = self.state.lock().unwrap();
        let pid = handle.pid;
        let p = st.procs.get_mut(&pid).ok_or(ThrottleError::ProcessGone { pid })?;
        if p.reject_throttle {
            return Err(ThrottleError::Platform { pid, code: 0x57, message: "rejected".into() });
        }
        p.throttled = Some(desc.enables_throttling());
        Ok(())
    }

    fn set_priority_class(&self, handle: &FakeHandle, class: PriorityClass) -> Result<(), ThrottleError> {
        let mut st = self.state.lock().unwrap();
        let pid = handle.pid;
        let p = st.procs.get_mut(&pid).ok_or(ThrottleError::ProcessGone { pid })?;
        p.priority = Some(class);
        Ok(())
    }

    fn current_session_id(&self) -> Option<u32> {
        self.state.lock().unwrap().session
    }

    fn processes(&self) -> Vec<ProcessEntry> {
        let st = self.state.lock().unwrap();
        st.procs
            .values()
            .map(|p| ProcessEntry { pid: p.pid, session_id: p.session, name: p.name.clone() })
            .collect()
    }
}


/// Notifier that just keeps the callback so tests can fire foreground changes by hand
#[derive(Default)]
pub struct FakeNotifier {
    cb: Mutex<Option<FgndCallback>>,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
}

impl FakeNotifier {
    pub fn fire(&self, hwnd: Hwnd) {
        // clone out first so the callback runs without our lock held
        let cb = self.cb.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(hwnd)
        }
    }
    pub fn callback(&self) -> Option<FgndCallback> {
        self.cb.lock().unwrap().clone()
    }
    pub fn is_subscribed(&self) -> bool {
        self.cb.lock().unwrap().is_some()
    }
    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }
    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

impl FocusNotifier for FakeNotifier {
    fn subscribe(&self, on_fgnd: FgndCallback) {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        *self.cb.lock().unwrap() = Some(on_fgnd);
    }
    fn unsubscribe(&self) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        *self.cb.lock().unwrap() = None;
    }
}
