//! Works out which process actually owns the user's attention for a given foreground window

use tracing::{debug, trace};

use crate::platform::{exe_file_name, Access, Hwnd, Pid, Platform};


/// Shared host process that carries the frames of packaged (UWP) apps
pub const FRAME_HOST_EXE : &str = "ApplicationFrameHost.exe";


/// A resolved foreground process .. the handle is released when this is dropped
pub struct Foreground <H> {
    pub handle : H,
    pub pid    : Pid,
    pub name   : String,
}


fn open_named <P:Platform> (platform:&P, pid:Pid) -> Option <Foreground <P::Handle>> {
    let handle = platform.open_process (pid, Access::QueryAndSet)
        .map_err (|e| trace! ("could not open fgnd process {pid} : {e}"))
        .ok()?;
    let name = platform.process_image_path (&handle)
        .map (|p| exe_file_name(&p).to_string())
        .unwrap_or_default();
    Some ( Foreground { handle, pid, name } )
}


/// Resolves the owning process of a foreground window.<br>
/// Returns `None` for the benign races (window already closed, process gone or protected) .. nothing to surface there.
pub fn resolve_foreground <P:Platform> (platform:&P, hwnd:Hwnd) -> Option <Foreground <P::Handle>> {

    let Some(pid) = platform.window_process_id (hwnd) else {
        trace! ("fgnd hwnd {hwnd:#x} has no owning process (closed?)");
        return None
    };
    let host = open_named (platform, pid)?;

    if !host.name.eq_ignore_ascii_case (FRAME_HOST_EXE) { return Some(host) }

    // the frame-host only carries the frame .. the real app owns one of its child windows
    // first child owned by some other process (and that we can actually open) wins
    let hosted = platform.child_windows (hwnd) .into_iter()
        .filter_map (|child| platform.window_process_id (child))
        .filter (|&child_pid| child_pid != pid)
        .find_map (|child_pid| open_named (platform, child_pid));

    match hosted {
        Some(app) => {
            debug! ("frame-host {} resolved to hosted app {}:{}", pid, app.name, app.pid);
            Some(app)
            // ^^ host handle drops here
        }
        None => {
            debug! ("frame-host {pid} had no hosted child process .. treating host as fgnd");
            Some(host)
        }
    }
}




#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePlatform, FakeProc};

    #[test]
    fn test_resolves_plain_window_to_its_process() {
        let fp = FakePlatform::new(1);
        fp.add_proc(FakeProc::new(100, "Notepad.exe", 1));
        fp.add_window(0x10, 100);

        let fg = resolve_foreground(&fp, 0x10).unwrap();
        assert_eq!(fg.pid, 100);
        assert_eq!(fg.name, "Notepad.exe");
        assert_eq!(fp.live_handles(), 1);
        drop(fg);
        assert_eq!(fp.live_handles(), 0);
    }

    #[test]
    fn test_closed_window_resolves_to_nothing() {
        let fp = FakePlatform::new(1);
        assert!(resolve_foreground(&fp, 0x99).is_none());
        assert!(fp.opens().is_empty());
    }

    #[test]
    fn test_protected_process_resolves_to_nothing() {
        let fp = FakePlatform::new(1);
        fp.add_proc(FakeProc::new(4, "csrss.exe", 1).protected());
        fp.add_window(0x20, 4);
        assert!(resolve_foreground(&fp, 0x20).is_none());
        assert_eq!(fp.live_handles(), 0);
    }

    #[test]
    fn test_frame_host_resolves_to_hosted_child_process() {
        let fp = FakePlatform::new(1);
        fp.add_proc(FakeProc::new(50, "ApplicationFrameHost.exe", 1));
        fp.add_proc(FakeProc::new(77, "Calculator.exe", 1));
        fp.add_window(0x30, 50);
        fp.add_child_window(0x30, 0x31, 50);
        fp.add_child_window(0x30, 0x32, 77);

        let fg = resolve_foreground(&fp, 0x30).unwrap();
        assert_eq!(fg.pid, 77);
        assert_eq!(fg.name, "Calculator.exe");
        // host handle already released, only the child's is held
        assert_eq!(fp.live_handles(), 1);
        assert_eq!(fp.opens(), vec![(50, Access::QueryAndSet), (77, Access::QueryAndSet)]);
    }

    #[test]
    fn test_frame_host_stops_at_first_qualifying_child() {
        let fp = FakePlatform::new(1);
        fp.add_proc(FakeProc::new(50, "applicationframehost.exe", 1));
        fp.add_proc(FakeProc::new(60, "First.exe", 1));
        fp.add_proc(FakeProc::new(61, "Second.exe", 1));
        fp.add_window(0x40, 50);
        fp.add_child_window(0x40, 0x41, 60);
        fp.add_child_window(0x40, 0x42, 61);

        let fg = resolve_foreground(&fp, 0x40).unwrap();
        assert_eq!(fg.pid, 60);
        assert!(!fp.opens().iter().any(|(pid, _)| *pid == 61));
    }

    #[test]
    fn test_frame_host_skips_children_it_cannot_open() {
        let fp = FakePlatform::new(1);
        fp.add_proc(FakeProc::new(50, "ApplicationFrameHost.exe", 1));
        fp.add_proc(FakeProc::new(60, "Locked.exe", 1).protected());
        fp.add_proc(FakeProc::new(61, "Open.exe", 1));
        fp.add_window(0x40, 50);
        fp.add_child_window(0x40, 0x41, 60);
        fp.add_child_window(0x40, 0x42, 61);

        let fg = resolve_foreground(&fp, 0x40).unwrap();
        assert_eq!(fg.pid, 61);
        assert_eq!(fp.live_handles(), 1);
    }

    #[test]
    fn test_frame_host_without_hosted_child_is_its_own_fgnd() {
        let fp = FakePlatform::new(1);
        fp.add_proc(FakeProc::new(50, "ApplicationFrameHost.exe", 1));
        fp.add_window(0x50, 50);
        fp.add_child_window(0x50, 0x51, 50);

        let fg = resolve_foreground(&fp, 0x50).unwrap();
        assert_eq!(fg.pid, 50);
        assert_eq!(fg.name, "ApplicationFrameHost.exe");
    }
}
