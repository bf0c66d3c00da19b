//! Credential announcement utility for host nodes.
//!
//! Plays the companion app: sends one provisioning announcement to a
//! running `garden-link` host node and waits for the acknowledgement.
//!
//! Usage:
//!   WIFI_SSID="Greenhouse" WIFI_PASSWORD="hunter2" cargo run --bin announce-credentials
//!
//! For open networks (no password):
//!   WIFI_SSID="Allotment" WIFI_PASSWORD="" cargo run --bin announce-credentials
//!
//! Optional:
//!   WIFI_BSSID="a4:cf:12:00:be:ef"    pin a specific access point
//!   GARDEN_LINK_TARGET="10.0.0.7:7878" node address (default 127.0.0.1:7878)

#[cfg(not(target_os = "espidf"))]
const DEFAULT_TARGET: &str = "127.0.0.1:7878";

/// How long to wait for the node to acknowledge.
#[cfg(not(target_os = "espidf"))]
const REPLY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[cfg(not(target_os = "espidf"))]
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    eprintln!("\n=== Announcement failed ===\n");
    std::process::exit(1);
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    use garden_link::config::{Bssid, ConfigError, Credentials};
    use garden_link::provisioning::{WireAnnouncement, ACK};
    use std::net::UdpSocket;

    println!("\n=== Garden Link Credential Announcement ===\n");

    let ssid = match std::env::var("WIFI_SSID") {
        Ok(s) if !s.is_empty() => s,
        _ => halt_with_error(
            "Error: WIFI_SSID environment variable not set.\n\n\
             Usage:\n  \
             WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" cargo run --bin announce-credentials",
        ),
    };
    let password = std::env::var("WIFI_PASSWORD").unwrap_or_default();
    let bssid = std::env::var("WIFI_BSSID").ok().filter(|b| !b.is_empty());
    let target = std::env::var("GARDEN_LINK_TARGET").unwrap_or_else(|_| DEFAULT_TARGET.into());

    // Catch mistakes locally rather than waiting for the node to discard them
    let mut credentials = match Credentials::new(ssid.as_str(), password.as_str()) {
        Ok(credentials) => credentials,
        Err(ConfigError::SsidTooLong { len, max }) => {
            halt_with_error(&format!("Error: SSID too long ({} bytes, max {})", len, max));
        }
        Err(ConfigError::PasswordTooLong { len, max }) => {
            halt_with_error(&format!(
                "Error: Password too long ({} bytes, max {})",
                len, max
            ));
        }
        Err(e) => halt_with_error(&format!("Error: {}", e)),
    };
    if let Some(text) = &bssid {
        match text.parse::<Bssid>() {
            Ok(pin) => credentials = credentials.with_bssid(pin),
            Err(e) => halt_with_error(&format!("Error: {}", e)),
        }
    }

    println!("SSID: {}", credentials.ssid());
    println!(
        "Password: {} ({} chars)",
        if credentials.is_open() { "(none)" } else { "****" },
        credentials.password().len()
    );
    if let Some(pin) = credentials.bssid() {
        println!("BSSID: {}", pin);
    }
    println!("Target: {}", target);

    let announcement = WireAnnouncement {
        ssid,
        password,
        bssid,
    };
    let payload = match serde_json::to_vec(&announcement) {
        Ok(payload) => payload,
        Err(e) => halt_with_error(&format!("Error encoding announcement: {}", e)),
    };

    let socket = match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => socket,
        Err(e) => halt_with_error(&format!("Error opening socket: {}", e)),
    };
    if let Err(e) = socket.set_read_timeout(Some(REPLY_TIMEOUT)) {
        halt_with_error(&format!("Error configuring socket: {}", e));
    }
    if let Err(e) = socket.send_to(&payload, target.as_str()) {
        halt_with_error(&format!("Error sending to {}: {}", target, e));
    }

    let mut reply = [0u8; 16];
    match socket.recv_from(&mut reply) {
        Ok((len, _)) if &reply[..len] == ACK => {
            println!("\n=== Announcement acknowledged ===");
            println!("\nThe node will persist the credentials and connect.");
        }
        Ok((len, _)) => halt_with_error(&format!(
            "Node refused the announcement: {}",
            String::from_utf8_lossy(&reply[..len])
        )),
        Err(e) => halt_with_error(&format!("No reply from {}: {}", target, e)),
    }
}

#[cfg(target_os = "espidf")]
fn main() {
    eprintln!("This binary runs on the host and provisions host nodes.");
    std::process::exit(1);
}
