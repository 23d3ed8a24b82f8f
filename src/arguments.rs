/// Centralized argument handling for cachebridge
///
/// Command-line arguments are captured once into CMD_ARGS and queried through
/// small helper functions, so the logger and the runtime read flags the same way.
///
/// Supported flags:
/// - `--config <path>` / `-c <path>` / first positional argument
/// - `--debug` / `-d` (debug output for every tag) and `--debug-<tag>`
/// - `--verbose`, `--quiet`, `--log-file <path>`, `--help` / `-h`
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::env;

/// Global command-line arguments storage
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Default configuration file used when none is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "cachebridge.json";

/// Flags that take a value; their value is never mistaken for the positional config path
const VALUE_FLAGS: &[&str] = &["--config", "-c", "--log-file"];

/// Sets the global command-line arguments
/// Used by tests and embedding binaries to override the default env::args() collection
pub fn set_cmd_args(args: Vec<String>) {
    *CMD_ARGS.lock() = args;
}

/// Gets a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    CMD_ARGS.lock().clone()
}

/// Checks if a specific argument is present in the command line
pub fn has_arg(arg: &str) -> bool {
    has_arg_in(&get_cmd_args(), arg)
}

/// Gets the value of a command-line argument that follows a flag
pub fn get_arg_value(flag: &str) -> Option<String> {
    get_arg_value_in(&get_cmd_args(), flag)
}

fn has_arg_in(args: &[String], arg: &str) -> bool {
    args.iter().skip(1).any(|a| a == arg)
}

fn get_arg_value_in(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .skip(1)
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 2))
        .cloned()
}

/// First argument that is neither a flag nor the value of a value-taking flag
fn positional_in(args: &[String]) -> Option<String> {
    let mut skip_next = false;
    for arg in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if !arg.starts_with('-') {
            return Some(arg.clone());
        }
    }
    None
}

fn config_path_in(args: &[String]) -> String {
    get_arg_value_in(args, "--config")
        .or_else(|| get_arg_value_in(args, "-c"))
        .or_else(|| positional_in(args))
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

// =============================================================================
// FLAG CHECKING FUNCTIONS
// =============================================================================

/// Configuration file path (`--config`, `-c` or the first positional argument)
pub fn get_config_path() -> String {
    config_path_in(&get_cmd_args())
}

/// Debug output for every log tag
pub fn is_debug_all_enabled() -> bool {
    has_arg("--debug") || has_arg("-d")
}

/// Debug output for a single tag, e.g. `--debug-sink`
pub fn is_debug_enabled_for(key: &str) -> bool {
    is_debug_all_enabled() || has_arg(&format!("--debug-{}", key))
}

/// Verbose mode - very detailed tracing including dependency logs
pub fn is_verbose_enabled() -> bool {
    has_arg("--verbose") || has_arg("-v")
}

/// Quiet mode - only warnings and errors
pub fn is_quiet_enabled() -> bool {
    has_arg("--quiet") || has_arg("-q")
}

/// Optional log file mirror
pub fn get_log_file_path() -> Option<String> {
    get_arg_value("--log-file")
}

/// Checks for help flags
pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

// =============================================================================
// HELP SYSTEM
// =============================================================================

/// Displays the help menu with all available flags and their descriptions
pub fn print_help() {
    println!("cachebridge - Quote cache to data pool bridge");
    println!();
    println!("USAGE:");
    println!("    cachebridge [FLAGS] [CONFIG]");
    println!();
    println!("OPTIONS:");
    println!("    --config, -c <path>       Subscription configuration file (default: {})", DEFAULT_CONFIG_PATH);
    println!("    --log-file <path>         Mirror log output into a file");
    println!("    --help, -h                Show this help message");
    println!();
    println!("LOGGING FLAGS:");
    println!("    --debug, -d               Debug output for every module");
    println!("    --debug-config            Configuration loading debug mode");
    println!("    --debug-subscriptions     Subscription registry debug mode");
    println!("    --debug-transport         Subscription transport debug mode");
    println!("    --debug-compose           Object and variable composition debug mode");
    println!("    --debug-sink              Output socket debug mode");
    println!("    --debug-bridge            Bridge forwarding debug mode");
    println!("    --verbose, -v             Very detailed tracing");
    println!("    --quiet, -q               Only warnings and errors");
}
