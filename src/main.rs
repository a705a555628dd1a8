
use std::process::ExitCode;

use ecomode::config::Config;


fn main() -> ExitCode {

    let conf = Config::locate();
    let load_res = conf.load();

    // we want the non-blocking log-appender guard to be here in main, to ensure any pending logs get flushed upon exit
    let _guard = conf.setup_log_subscriber();

    tracing::info! ("Starting EcoMode v{} ...", Config::ECOMODE_VERSION);

    // config loading precedes the log subscriber (which is configured by it), so its outcome is only reported now
    match load_res {
        Ok(()) => tracing::info! ("loaded config from {:?}", conf.path()),
        Err(e) => tracing::warn! ("could not load config from {:?} ({e}) .. using defaults", conf.path()),
    }

    run (&conf)
}



#[cfg(windows)]
fn run (conf:&Config) -> ExitCode {

    use std::sync::{mpsc, Mutex, PoisonError};
    use std::time::Duration;

    use once_cell::sync::OnceCell;
    use tracing::{info, warn};
    use windows::Win32::Foundation::BOOL;
    use windows::Win32::System::Console::SetConsoleCtrlHandler;

    use ecomode::controller::Controller;
    use ecomode::hook::WinEventNotifier;
    use ecomode::win_apis::{self, Win32Platform};

    // the ctrl handler runs on a thread the OS spins up .. it signals main, then holds on until the restore is done,
    // since for close/logoff/shutdown the process is torn down as soon as the handler returns
    static CTRL_TX   : OnceCell <Mutex <mpsc::Sender <u32>>> = OnceCell::new();
    static DONE_RX   : OnceCell <Mutex <mpsc::Receiver <()>>> = OnceCell::new();
    const  DONE_WAIT : Duration = Duration::from_secs (4);

    unsafe extern "system" fn console_ctrl_handler (ctrl_type:u32) -> BOOL {
        if let Some(tx) = CTRL_TX.get() {
            let _ = tx.lock().unwrap_or_else(PoisonError::into_inner) .send (ctrl_type);
        }
        if let Some(rx) = DONE_RX.get() {
            let _ = rx.lock().unwrap_or_else(PoisonError::into_inner) .recv_timeout (DONE_WAIT);
        }
        BOOL::from (true)
    }


    match win_apis::check_cur_proc_elevated() {
        Some(true) => info! ("running elevated"),
        _ => warn! ("not running elevated .. processes of other users and protected processes will be skipped"),
    }

    let ctl = Controller::new (Win32Platform, WinEventNotifier::new());
    ctl.configure (conf.get_bypass_processes());

    if !conf.check_flag__eco_qos_enabled() {
        info! ("eco_qos_enabled is off .. restoring all processes and exiting");
        ctl.disable_feature();
        return ExitCode::SUCCESS
    }

    let (ctrl_tx, ctrl_rx) = mpsc::channel::<u32>();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let _ = CTRL_TX.set (Mutex::new (ctrl_tx));
    let _ = DONE_RX.set (Mutex::new (done_rx));

    if let Err(e) = unsafe { SetConsoleCtrlHandler (Some(console_ctrl_handler), BOOL::from(true)) } {
        warn! ("could not register console ctrl handler ({e}) .. processes wont be restored on exit");
    }

    ctl.enable_feature();

    match ctrl_rx.recv() {
        Ok(ctrl_type) => info! ("received console ctrl event {ctrl_type} .. shutting down"),
        Err(_) => warn! ("console ctrl channel closed .. shutting down"),
    }

    ctl.disable_feature();
    let _ = done_tx.send (());

    info! ("EcoMode stopped");
    ExitCode::SUCCESS
}


#[cfg(not(windows))]
fn run (_conf:&Config) -> ExitCode {
    tracing::error! ("EcoMode requires Windows (process power throttling is a Win32 feature) .. exiting");
    ExitCode::FAILURE
}
