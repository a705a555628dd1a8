//! The OS seam for the throttling controller.
//!
//! Everything the controller needs from the OS goes through [`Platform`] .. the Win32 build plugs in
//! `win_apis::Win32Platform`, the tests plug in an in-memory fake.

use thiserror::Error;

use crate::throttle::{PriorityClass, ThrottleDescriptor};


pub type Hwnd = isize;
pub type Pid  = u32;



# [ derive (Debug, Copy, Clone, Eq, PartialEq, Hash) ]
/// The two sets of process-access rights we ever ask for
pub enum Access {
    /// query-limited-info + set-info .. needed when we must also read the image name
    QueryAndSet,
    /// set-info only .. enough to toggle throttling on an already-known pid
    SetOnly,
}


# [ derive (Debug, Clone, Eq, PartialEq) ]
pub struct ProcessEntry {
    pub pid        : Pid,
    pub session_id : Option<u32>,
    pub name       : String,
}


# [ derive (Debug, Clone, Eq, PartialEq, Error) ]
pub enum ThrottleError {
    # [ error ("access denied to process {pid}") ]
    AccessDenied { pid: Pid },

    # [ error ("process {pid} is gone") ]
    ProcessGone { pid: Pid },

    # [ error ("platform call failed for process {pid} (code 0x{code:08X}): {message}") ]
    Platform { pid: Pid, code: i32, message: String },
}

impl ThrottleError {
    /// Expected failures are the benign ones (protected processes, exited processes) .. these get logged low
    pub fn is_expected (&self) -> bool {
        matches! (self, ThrottleError::AccessDenied {..} | ThrottleError::ProcessGone {..})
    }
    pub fn pid (&self) -> Pid {
        match self {
            ThrottleError::AccessDenied { pid } | ThrottleError::ProcessGone { pid } | ThrottleError::Platform { pid, .. } => *pid
        }
    }
}



/// OS operations used by the resolver, the throttle toggle and the sweeps.
///
/// `Handle` must release the underlying OS handle when dropped, so that every exit path
/// (including early returns on benign failures) gives it back.
pub trait Platform : Send + Sync {

    type Handle;

    /// Owning process of a window .. `None` when the window is already gone (zero thread or pid)
    fn window_process_id (&self, hwnd:Hwnd) -> Option<Pid>;

    fn open_process (&self, pid:Pid, access:Access) -> Result <Self::Handle, ThrottleError>;

    /// Full image path of an opened process
    fn process_image_path (&self, handle:&Self::Handle) -> Option<String>;

    /// Child windows of a window, in enumeration order
    fn child_windows (&self, hwnd:Hwnd) -> Vec<Hwnd>;

    fn set_power_throttling (&self, handle:&Self::Handle, desc:&ThrottleDescriptor) -> Result <(), ThrottleError>;

    fn set_priority_class (&self, handle:&Self::Handle, class:PriorityClass) -> Result <(), ThrottleError>;

    /// Session id of our own process
    fn current_session_id (&self) -> Option<u32>;

    /// Snapshot of all processes on the machine
    fn processes (&self) -> Vec<ProcessEntry>;
}



/// Extracts the file name from an image path (handles both separators)
pub fn exe_file_name (path:&str) -> &str {
    path .rsplit (['\\', '/']) .next() .unwrap_or_default()
}
