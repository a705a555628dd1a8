#![ allow (non_upper_case_globals, non_snake_case) ]

use std::ffi::c_void;
use std::mem::size_of;

use tracing::warn;

use windows::core::PWSTR;
use windows::Win32::Foundation::{BOOL, CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, HANDLE, HWND, LPARAM};
use windows::Win32::Security::{GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS
};
use windows::Win32::System::RemoteDesktop::ProcessIdToSessionId;
use windows::Win32::System::Threading::{
    GetCurrentProcess, GetCurrentProcessId, IDLE_PRIORITY_CLASS, NORMAL_PRIORITY_CLASS, OpenProcess, OpenProcessToken,
    PROCESS_ACCESS_RIGHTS, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SET_INFORMATION,
    ProcessPowerThrottling, QueryFullProcessImageNameW, SetPriorityClass, SetProcessInformation
};
use windows::Win32::UI::WindowsAndMessaging::{EnumChildWindows, GetWindowThreadProcessId};

use crate::platform::{Access, Hwnd, Pid, Platform, ProcessEntry, ThrottleError};
use crate::throttle::{PriorityClass, ThrottleDescriptor};



/// Owned win32 handle .. closed on drop
pub struct WinHandle {
    h   : HANDLE,
    pid : Pid,
}
impl Drop for WinHandle {
    fn drop (&mut self) {
        if !self.h.is_invalid() { unsafe { let _ = CloseHandle (self.h); } }
    }
}


fn to_throttle_err (pid:Pid, e:windows::core::Error) -> ThrottleError {
    let code = e.code();
    if code == ERROR_ACCESS_DENIED.to_hresult() {
        ThrottleError::AccessDenied { pid }
    } else if code == ERROR_INVALID_PARAMETER.to_hresult() {
        // what OpenProcess gives back for a pid that has already exited
        ThrottleError::ProcessGone { pid }
    } else {
        ThrottleError::Platform { pid, code: code.0, message: e.message() }
    }
}

fn access_rights (access:Access) -> PROCESS_ACCESS_RIGHTS {
    match access {
        Access::QueryAndSet => PROCESS_QUERY_LIMITED_INFORMATION | PROCESS_SET_INFORMATION,
        Access::SetOnly     => PROCESS_SET_INFORMATION,
    }
}



# [ derive (Debug, Default, Copy, Clone) ]
pub struct Win32Platform;

impl Platform for Win32Platform {

    type Handle = WinHandle;

    fn window_process_id (&self, hwnd:Hwnd) -> Option<Pid> { unsafe {
        let mut pid : u32 = 0;
        let thread_id = GetWindowThreadProcessId (HWND (hwnd as *mut c_void), Some(&mut pid));
        (thread_id != 0 && pid != 0) .then_some (pid)
    } }

    fn open_process (&self, pid:Pid, access:Access) -> Result <WinHandle, ThrottleError> { unsafe {
        OpenProcess (access_rights(access), BOOL::from(false), pid)
            .map (|h| WinHandle { h, pid })
            .map_err (|e| to_throttle_err (pid, e))
    } }

    fn process_image_path (&self, handle:&WinHandle) -> Option<String> { unsafe {
        const MAX_LEN : usize = 1024;
        let mut buf = [0u16; MAX_LEN];
        let mut len = MAX_LEN as u32;
        QueryFullProcessImageNameW (handle.h, PROCESS_NAME_WIN32, PWSTR::from_raw(buf.as_mut_ptr()), &mut len) .ok()?;
        Some ( String::from_utf16_lossy (&buf[..len as usize]) )
    } }

    fn child_windows (&self, hwnd:Hwnd) -> Vec<Hwnd> {
        get_child_windows (hwnd)
    }

    fn set_power_throttling (&self, handle:&WinHandle, desc:&ThrottleDescriptor) -> Result <(), ThrottleError> { unsafe {
        SetProcessInformation (
            handle.h, ProcessPowerThrottling,
            desc as *const ThrottleDescriptor as *const c_void, size_of::<ThrottleDescriptor>() as u32
        ) .map_err (|e| to_throttle_err (handle.pid, e))
    } }

    fn set_priority_class (&self, handle:&WinHandle, class:PriorityClass) -> Result <(), ThrottleError> { unsafe {
        let class = match class { PriorityClass::Idle => IDLE_PRIORITY_CLASS, PriorityClass::Normal => NORMAL_PRIORITY_CLASS };
        SetPriorityClass (handle.h, class) .map_err (|e| to_throttle_err (handle.pid, e))
    } }

    fn current_session_id (&self) -> Option<u32> {
        get_pid_session_id ( unsafe { GetCurrentProcessId() } )
    }

    fn processes (&self) -> Vec<ProcessEntry> { unsafe {
        let snap = match CreateToolhelp32Snapshot (TH32CS_SNAPPROCESS, 0) {
            Ok(h)  => WinHandle { h, pid: 0 },
            Err(e) => { warn! ("could not snapshot processes : {e}"); return vec![] }
        };
        let mut entry = PROCESSENTRY32W { dwSize: size_of::<PROCESSENTRY32W>() as u32, ..Default::default() };
        let mut procs = vec![];
        let mut more = Process32FirstW (snap.h, &mut entry) .is_ok();
        while more {
            let name_len = entry.szExeFile.iter() .position (|&c| c == 0) .unwrap_or (entry.szExeFile.len());
            procs.push ( ProcessEntry {
                pid        : entry.th32ProcessID,
                session_id : get_pid_session_id (entry.th32ProcessID),
                name       : String::from_utf16_lossy (&entry.szExeFile[..name_len]),
            } );
            more = Process32NextW (snap.h, &mut entry) .is_ok();
        }
        procs
    } }
}



pub fn get_pid_session_id (pid:Pid) -> Option<u32> { unsafe {
    let mut session : u32 = 0;
    ProcessIdToSessionId (pid, &mut session) .ok() .map (|_| session)
} }


// the enum callback gets a pointer to our local vec through the lparam, so concurrent calls dont share any state
pub fn get_child_windows (hwnd:Hwnd) -> Vec<Hwnd> { unsafe {
    let mut children : Vec<Hwnd> = vec![];
    let _ = EnumChildWindows (
        HWND (hwnd as *mut c_void), Some(enum_child_windows_cb), LPARAM (&mut children as *mut Vec<Hwnd> as isize)
    );
    children
} }

#[ allow (clippy::missing_safety_doc) ]
pub unsafe extern "system" fn enum_child_windows_cb (hwnd:HWND, lparam:LPARAM) -> BOOL {
    let children = &mut *(lparam.0 as *mut Vec<Hwnd>);
    children.push (hwnd.0 as Hwnd);
    BOOL::from (true)
}



pub fn check_cur_proc_elevated () -> Option<bool> {
    match check_proc_elevated ( unsafe { GetCurrentProcess() } ) {
        Ok (res) => Some(res),
        Err (e) => {
            warn! ("Error checking process elevation : {:?}", e);
            None
    }  }
}
pub fn check_proc_elevated (h_proc:HANDLE) -> windows::core::Result<bool> { unsafe {
    let mut h_token = HANDLE::default();
    OpenProcessToken (h_proc, TOKEN_QUERY, &mut h_token)?;
    let h_token = WinHandle { h: h_token, pid: 0 };
    let mut token_info : TOKEN_ELEVATION = TOKEN_ELEVATION::default();
    let mut token_info_len = size_of::<TOKEN_ELEVATION>() as u32;
    GetTokenInformation (h_token.h, TokenElevation, Some(&mut token_info as *mut _ as *mut _), token_info_len, &mut token_info_len)?;
    Ok (token_info.TokenIsElevated != 0 )
} }
