use std::env;

const DEFAULT_KEYDB_URL: &str = "redis://127.0.0.1:5556/";

pub fn keydb_url() -> String {
    env::var("SPAWND_KEYDB_URL").unwrap_or_else(|_| DEFAULT_KEYDB_URL.to_string())
}

pub fn connect() -> Result<redis::Connection, String> {
    let url = keydb_url();
    let client = redis::Client::open(url.as_str())
        .map_err(|err| format!("Failed to open KeyDB client: {err}"))?;
    client
        .get_connection()
        .map_err(|err| format!("Failed to connect to KeyDB: {err}"))
}
