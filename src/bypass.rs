//! The set of executables that are never throttled

use std::collections::HashSet;

use tracing::debug;


/// Platform and shell essentials that must never be throttled
pub const DEFAULT_BYPASS : &[&str] = &[
    "ecomode.exe",
    "msedge.exe", "webviewhost.exe", "chrome.exe",
    "applicationframehost.exe",
    "taskmgr.exe", "procmon.exe", "procmon64.exe",
    "widgets.exe",
    "dwm.exe", "explorer.exe", "shellexperiencehost.exe",
    "startmenuexperiencehost.exe", "searchhost.exe", "sihost.exe", "fontdrvhost.exe",
    "chsime.exe", "ctfmon.exe",
    "csrss.exe", "smss.exe", "svchost.exe",
    "wudfrd.exe",
];

// throttling the debugger host while iterating on this is no fun
# [ cfg (debug_assertions) ]
const DEBUG_BYPASS : &[&str] = &[ "devenv.exe" ];
# [ cfg (not (debug_assertions)) ]
const DEBUG_BYPASS : &[&str] = &[];



/// Normalizes a user-supplied process name : trims whitespace and quotes, enforces the `.exe` suffix, lower-cases.<br>
/// Returns `None` if nothing is left after trimming.
pub fn normalize_exe_name (raw:&str) -> Option<String> {
    let name = raw.trim() .trim_matches('"') .trim();
    if name.is_empty() { return None }
    let mut name = name.to_lowercase();
    if !name.ends_with(".exe") { name.push_str(".exe") }
    Some (name)
}

/// Our own executable name, normalized .. covers the case where the exe was renamed
pub fn self_exe_name () -> Option<String> {
    std::env::current_exe().ok()
        .and_then (|p| p.file_stem() .map (|s| s.to_string_lossy().to_string()))
        .and_then (|s| normalize_exe_name(&s))
}

/// Splits a user-edited block of text into one entry per line
pub fn split_user_lines (text:&str) -> Vec<String> {
    text.lines() .map (|l| l.trim()) .filter (|l| !l.is_empty()) .map (|l| l.to_string()) .collect()
}



# [ derive (Debug, Clone, Eq, PartialEq) ]
/// Normalized, case-insensitive set of executable names.<br>
/// Always a superset of the built-in defaults, and always holds our own exe name (when resolvable).
pub struct BypassSet {
    names : HashSet<String>,
}

impl Default for BypassSet {
    fn default () -> Self { Self::from_user_list (std::iter::empty::<&str>()) }
}

impl BypassSet {

    /// Builds a fresh set from the defaults, the user's entries, and our own exe name
    pub fn from_user_list <I, S> (user_list:I) -> BypassSet
        where I: IntoIterator<Item=S>, S: AsRef<str>
    {
        let mut names : HashSet<String> = DEFAULT_BYPASS .iter() .chain (DEBUG_BYPASS) .map (|s| s.to_string()) .collect();
        let n_defaults = names.len();
        names.extend ( user_list .into_iter() .filter_map (|s| normalize_exe_name (s.as_ref())) );
        match self_exe_name() {
            Some(n) => { names.insert(n); }
            None    => debug! ("could not resolve own exe name .. skipping self-protection entry"),
        }
        debug! ("bypass set built : {} defaults, {} total", n_defaults, names.len());
        BypassSet { names }
    }

    pub fn contains (&self, name:&str) -> bool {
        normalize_exe_name(name) .is_some_and (|n| self.names.contains(&n))
    }

    pub fn len (&self) -> usize { self.names.len() }
}
