//! Privilege detection for ARP scanning
//!
//! Sending ARP requests needs raw link-layer access:
//! - Linux/macOS: root (or CAP_NET_RAW for arping on Linux)
//! - Windows: an Administrator shell for nping

use super::ScanError;

/// Check if the current process is running with elevated privileges
pub fn is_elevated() -> bool {
    #[cfg(target_os = "windows")]
    {
        is_elevated_windows()
    }

    #[cfg(unix)]
    {
        is_elevated_unix()
    }

    #[cfg(not(any(target_os = "windows", unix)))]
    {
        false
    }
}

#[cfg(target_os = "windows")]
fn is_elevated_windows() -> bool {
    use std::process::Command;

    match Command::new("whoami").args(["/groups"]).output() {
        Ok(output) => {
            let output_str = String::from_utf8_lossy(&output.stdout);
            output_str.contains("S-1-16-12288") || output_str.contains("High Mandatory Level")
        }
        Err(_) => false,
    }
}

#[cfg(unix)]
fn is_elevated_unix() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Fail with a user-facing error unless the process is elevated.
pub fn require_elevated() -> Result<(), ScanError> {
    if is_elevated() {
        tracing::debug!("Running with elevated privileges");
        Ok(())
    } else {
        Err(ScanError::privilege_required("ARP scan"))
    }
}

/// Get platform-specific instructions for running with elevated privileges
pub fn get_elevation_instructions() -> String {
    #[cfg(target_os = "windows")]
    {
        "To run an ARP scan on Windows:\n\
         1. Install Nmap (which provides nping) and make sure nping is on PATH\n\
         2. Open a terminal with 'Run as administrator'\n\
         3. Run arpsweep from that terminal"
            .to_string()
    }

    #[cfg(target_os = "linux")]
    {
        "To run an ARP scan on Linux:\n\
         \n\
         Run as root:\n\
         $ sudo arpsweep\n\
         \n\
         The scan invokes arping (iputils or Thomas Habets' arping) once per\n\
         address, which needs raw socket access."
            .to_string()
    }

    #[cfg(target_os = "macos")]
    {
        "To run an ARP scan on macOS:\n\
         \n\
         Run as root:\n\
         $ sudo arpsweep\n\
         \n\
         arping is available from Homebrew: brew install arping"
            .to_string()
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        "Elevated privileges are required to send ARP requests.\n\
         Please re-run arpsweep as root or Administrator."
            .to_string()
    }
}
