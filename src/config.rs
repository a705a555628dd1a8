#![ allow (non_snake_case) ]

use std::fs;
use std::ops::{Deref, Not};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use time::macros::format_description;
use toml_edit::DocumentMut;

use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::prelude::*;

use crate::bypass;




# [ derive (Debug, Error) ]
pub enum ConfigError {
    # [ error ("no writeable config location") ]
    NoLocation,
    # [ error ("config file is empty") ]
    Empty,
    # [ error ("config io error: {0}") ]
    Io ( # [ from ] std::io::Error ),
    # [ error ("config parse error: {0}") ]
    Parse ( # [ from ] toml_edit::TomlError ),
}


# [ derive (Debug) ]
pub struct _Config {
    pub toml : RwLock <Option <DocumentMut>>,
    path     : Option <PathBuf>,
}

# [ derive (Debug, Clone) ]
pub struct Config ( Arc <_Config> );

impl Deref for Config {
    type Target = _Config;
    fn deref (&self) -> &_Config { &self.0 }
}




// first some module level helper functions ..
/// Returns the directory of the currently running executable
fn get_app_dir () -> Option<PathBuf> {
    std::env::current_exe().ok() .and_then (|p| p.parent() .map (|p| p.to_path_buf()))
}

/// Checks whether a path is writeable by the current user by attempting to open/create a file in write mode
fn is_writeable (path: &Path) -> bool {
    fs::OpenOptions::new().write(true).create(true).truncate(false).open(path).is_ok()
    // note that ^^ this is similar to 'touch' and will create an empty file if it doesnt exist
}

/// Config file next to the exe if we can write there, else under the user's local data dir
fn locate_config_file () -> Option<PathBuf> {
    let app_dir_loc = get_app_dir() .map (|p| p.join(Config::CONF_FILE_NAME));
    if app_dir_loc.as_ref() .is_some_and (|p| is_writeable(p)) {
        return app_dir_loc
    }
    let data_dir = dirs::data_local_dir() .map (|p| p.join("EcoMode"));
    if let Some(dir) = data_dir.as_ref() .filter (|p| !p.exists()) {
        let _ = fs::create_dir_all (dir);
    }
    data_dir .map (|p| p.join(Config::CONF_FILE_NAME)) .filter (|p| is_writeable(p))
}




impl Config {

    pub const CONF_FILE_NAME : &'static str = "ecomode.conf.toml";
    pub const DEFAULT_CONF   : &'static str = include_str!("../ecomode.conf.toml");
    // ^^ our ecomode.conf.toml is at root of project, the include_str macro will load the contents at compile time

    pub const ECOMODE_VERSION : &'static str = env!("CARGO_PKG_VERSION");


    /// Config at the standard location .. nothing is read until [`Config::load`]
    pub fn locate () -> Config {
        Self::new (locate_config_file())
    }

    /// Config backed by a specific file .. with `None`, it runs purely off defaults
    pub fn new (path:Option<PathBuf>) -> Config {
        Config ( Arc::new ( _Config { toml: RwLock::new (None), path } ) )
    }

    pub fn path (&self) -> Option<&Path> { self.path.as_deref() }

    pub fn get_log_loc (&self) -> Option<PathBuf> {
        self.path() .and_then (|p| p.parent()) .map (|p| p.to_path_buf())
    }


    /// Reads the config file. If there's no location, or the file is empty or fails to read or parse,
    /// the bundled default is loaded and written back, and the original failure is returned.<br>
    /// Nothing is logged here, as this runs before the log subscriber (which depends on it) is set up.
    pub fn load (&self) -> Result <(), ConfigError> {
        match self.try_load() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.trigger_config_file_reset()?;
                Err(e)
            }
        }
    }
    fn try_load (&self) -> Result <(), ConfigError> {
        let path = self.path.as_ref() .ok_or (ConfigError::NoLocation)?;
        let cfg_str = fs::read_to_string (path)?;
        if cfg_str.trim().is_empty() { return Err (ConfigError::Empty) }
        let toml = DocumentMut::from_str (&cfg_str)?;
        self.toml.write().unwrap_or_else(PoisonError::into_inner) .replace (toml);
        Ok(())
    }

    pub fn trigger_config_file_reset (&self) -> Result <(), ConfigError> {
        let toml = DocumentMut::from_str (Self::DEFAULT_CONF)?;
        self.toml.write().unwrap_or_else(PoisonError::into_inner) .replace (toml);
        self.write_back_toml()
    }

    fn write_back_toml (&self) -> Result <(), ConfigError> {
        let Some(conf_path) = self.path.as_ref() else { return Ok(()) };
        let toml_str = self.toml.read().unwrap_or_else(PoisonError::into_inner) .as_ref() .map (|d| d.to_string()) .unwrap_or_default();
        fs::write (conf_path, toml_str)?;
        Ok(())
    }



    pub fn setup_log_subscriber (&self) -> Option<WorkerGuard> {

        let level = self.get_log_level();

        let timer = LocalTime::new ( format_description! (
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
        ) );

        let log_appender = self.get_log_loc() .filter (|_| level != LevelFilter::OFF) .and_then (|log_loc| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("ecomode_log")
                .filename_suffix("log")
                .max_log_files(7)
                .build(log_loc)
                .map_err (|e| eprintln! ("could not set up log file appender : {e}"))
                .ok()
        } );

        let (file_layer, guard) = match log_appender {
            Some(appender) => {
                let (nb_log_appender, guard) = non_blocking (appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(nb_log_appender)
                    .with_timer(timer.clone())
                    .with_ansi(false);
                (Some(layer), Some(guard))
            }
            None => (None, None)
        };

        let console_layer = self.check_flag__log_to_console() .then (|| {
            tracing_subscriber::fmt::layer() .with_writer(std::io::stderr) .with_timer(timer)
        } );

        if tracing_subscriber::registry() .with(level) .with(file_layer) .with(console_layer) .try_init() .is_err() {
            eprintln! ("a global log subscriber was already set .. keeping that one");
        }
        guard
        // ^^ the non-blocking log-appender guard must be kept alive (in main) so pending logs get flushed
    }



    fn check_flag (&self, flag_name:&str, default:bool) -> bool {
        self.toml.read().unwrap_or_else(PoisonError::into_inner) .as_ref()
            .and_then (|t| t.get(flag_name))
            .and_then (|t| t.as_bool())
            .unwrap_or (default)
    }

    fn get_string (&self, key:&str, default:&str) -> String {
        self.toml.read().unwrap_or_else(PoisonError::into_inner) .as_ref()
            .and_then (|t| t.get(key))
            .and_then (|t| t.as_str()) .map (|s| s.to_string())
            .unwrap_or (default.to_string())
    }

    /// Reads either a string array, or a multi-line string with one entry per line
    fn get_string_list (&self, key:&str) -> Vec<String> {
        let toml = self.toml.read().unwrap_or_else(PoisonError::into_inner);
        let Some(item) = toml.as_ref() .and_then (|t| t.get(key)) else { return vec![] };
        if let Some(arr) = item.as_array() {
            return arr.iter() .filter_map (|v| v.as_str().map(|s| s.to_string())) .collect()
        }
        item.as_str() .map (bypass::split_user_lines) .unwrap_or_default()
    }



    // all the config flags we can check
    pub fn check_flag__eco_qos_enabled  (&self) -> bool { self.check_flag ( "eco_qos_enabled",  true ) }
    pub fn check_flag__logging_enabled  (&self) -> bool { self.check_flag ( "logging_enabled",  true ) }
    pub fn check_flag__log_to_console   (&self) -> bool { self.check_flag ( "log_to_console",   true ) }


    pub fn get_log_level (&self) -> LevelFilter {
        if self.check_flag__logging_enabled().not() {
            return LevelFilter::OFF;
        }
        match self.get_string("logging_level", "INFO").to_uppercase().as_str() {
            "TRACE" => LevelFilter::TRACE,
            "DEBUG" => LevelFilter::DEBUG,
            //"INFO"  => LevelFilter::INFO,
            "WARN"  => LevelFilter::WARN,
            "ERROR" => LevelFilter::ERROR,
            "OFF"   => LevelFilter::OFF,
            _       => LevelFilter::INFO,
        }
    }

    /// The user's bypass entries, as written (normalization happens when the set is built)
    pub fn get_bypass_processes (&self) -> Vec<String> { self.get_string_list ("bypass_processes") }

}
