const CREDENTIAL_KEYS: [&str; 3] = ["SSID", "PASSWORD", "MQTT_SERVER"];

fn main() {
    println!("cargo:rerun-if-changed=.env");

    // Values already exported in the shell win over the .env file.
    let _ = dotenvy::dotenv();
    for key in CREDENTIAL_KEYS {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }

    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        println!("cargo:rustc-link-arg=-Tlinkall.x");
    }
}
