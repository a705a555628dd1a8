use std::sync::Arc;

use strum_macros::AsRefStr;


# [ derive (Debug, Eq, PartialEq, Hash, Copy, Clone, AsRefStr) ]
/// Severity attached to every notice .. lets a UI pick a color, and maps onto tracing levels
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Observability hook : receives every notable action. Purely informational, nothing reads back from it.
pub type NoticeSink = Arc < dyn Fn (&str, Severity) + Send + Sync + 'static >;



/// Emits a notice to tracing at the matching level, and to the sink if there is one
pub fn emit (sink:Option<&NoticeSink>, msg:&str, sev:Severity) {
    match sev {
        Severity::Debug => tracing::debug! ("{msg}"),
        Severity::Info  => tracing::info!  ("{msg}"),
        Severity::Warn  => tracing::warn!  ("{msg}"),
        Severity::Error => tracing::error! ("{msg}"),
    }
    if let Some(sink) = sink { sink (msg, sev) }
}



#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_forwards_to_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = seen.clone();
        let sink: NoticeSink = Arc::new(move |m: &str, s: Severity| seen_c.lock().unwrap().push((m.to_string(), s)));
        emit(Some(&sink), "hello", Severity::Warn);
        emit(None, "dropped", Severity::Info);
        assert_eq!(*seen.lock().unwrap(), vec![("hello".to_string(), Severity::Warn)]);
    }

    #[test]
    fn test_severity_names_for_sinks() {
        assert_eq!(Severity::Debug.as_ref(), "Debug");
        assert_eq!(Severity::Error.as_ref(), "Error");
    }
}
