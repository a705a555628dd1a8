//! Foreground-change notifications from a win-event hook

use std::sync::{PoisonError, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::thread::spawn;

use once_cell::sync::Lazy;
use tracing::{debug, error, warn};

use windows::Win32::Foundation::{HMODULE, HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Accessibility::{HWINEVENTHOOK, SetWinEventHook, UnhookWinEvent};
use windows::Win32::UI::WindowsAndMessaging::{
    EVENT_SYSTEM_FOREGROUND, GetMessageW, MSG, PeekMessageW, PM_NOREMOVE, PostThreadMessageW, WINEVENT_OUTOFCONTEXT, WM_USER
};

use crate::controller::{FgndCallback, FocusNotifier};
use crate::platform::Hwnd;



const KILL_MSG : u32 = WM_USER + 1;

// the win-event callback is a bare fn, so the current subscriber lives here
static FGND_CB : Lazy <RwLock <Option <FgndCallback>>> = Lazy::new (|| RwLock::new (None));


/// Listens for EVENT_SYSTEM_FOREGROUND on a dedicated message-loop thread.<br>
/// There's a single hook per process, so only one of these should be in use at a time.
# [ derive (Debug, Default) ]
pub struct WinEventNotifier {
    hook_thread : AtomicU32,
}

impl WinEventNotifier {

    pub fn new () -> WinEventNotifier { WinEventNotifier::default() }

    fn start_hook_thread (&self) {
        let (tx, rx) = mpsc::channel::<u32>();

        spawn ( move || unsafe {
            // peeking creates this thread's message queue, so a kill-msg posted right after we report in wont be lost
            let mut msg: MSG = MSG::default();
            let _ = PeekMessageW (&mut msg, HWND::default(), 0, 0, PM_NOREMOVE);

            let hook = SetWinEventHook (
                EVENT_SYSTEM_FOREGROUND, EVENT_SYSTEM_FOREGROUND, HMODULE::default(),
                Some(win_event_hook_cb), 0, 0, WINEVENT_OUTOFCONTEXT
            );
            if hook.is_invalid() {
                error! ("could not set fgnd win-event hook .. no foreground tracking !!");
                let _ = tx.send (0);
                return
            }
            let _ = tx.send (GetCurrentThreadId());

            // win32 delivers out-of-context hook events through this thread's message loop
            while GetMessageW (&mut msg, HWND::default(), 0, 0) .0 > 0 {
                if msg.message == KILL_MSG {
                    debug! ("received kill-msg in fgnd hook thread .. terminating thread ..");
                    break
                }
            }
            let _ = UnhookWinEvent (hook);
        } );

        match rx.recv() {
            Ok(thread_id) => self.hook_thread.store (thread_id, Ordering::SeqCst),
            Err(_) => warn! ("fgnd hook thread exited before reporting in"),
        }
    }

    fn kill_hook_thread (&self) {
        let thread_id = self.hook_thread.swap (0, Ordering::SeqCst);
        if thread_id != 0 { unsafe {
            let _ = PostThreadMessageW (thread_id, KILL_MSG, WPARAM::default(), LPARAM::default());
        } }
    }
}


impl FocusNotifier for WinEventNotifier {

    fn subscribe (&self, on_fgnd:FgndCallback) {
        *FGND_CB.write().unwrap_or_else(PoisonError::into_inner) = Some(on_fgnd);
        if self.hook_thread.load (Ordering::SeqCst) == 0 {
            self.start_hook_thread();
        }
    }

    fn unsubscribe (&self) {
        self.kill_hook_thread();
        *FGND_CB.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}



#[ allow (clippy::missing_safety_doc) ]
pub unsafe extern "system" fn win_event_hook_cb (
    _id_hook: HWINEVENTHOOK, event: u32, hwnd: HWND,
    id_object: i32, id_child: i32, _id_thread: u32, _event_time: u32
) {
    if event != EVENT_SYSTEM_FOREGROUND || id_object != 0 || id_child != 0 { return }
    // clone out so the transition runs without the lock held
    let cb = FGND_CB.read().unwrap_or_else(PoisonError::into_inner).clone();
    if let Some(cb) = cb { cb (hwnd.0 as Hwnd) }
}
