use super::*;

impl Default for EntryData {
    fn default() -> Self {
        Self {
            country_prefix: None,
            minute: DEFAULT_MINUTE,
            base_url: DEFAULT_BASE_URL.to_string(),
            upload_url: String::new(),
            api_key: String::new(),
            upload_sensors: String::new(),
            upload_interval: DEFAULT_UPLOAD_INTERVAL,
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            price_key: "current_period_all_in_price".to_string(),
            threshold: 0.20,
            target_entity: "switch.inverter".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 15,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/ampster.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}
