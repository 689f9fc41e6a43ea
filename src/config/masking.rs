use serde_json::Value;

const MASKED: &str = "***MASKED***";

/// Replace known secret fields in a serialized config JSON with `"***MASKED***"`.
///
/// Null or missing values are left as-is (they are not a leak). Webhook URLs
/// embed their own token, so they are masked too.
pub fn mask_config_secrets(value: &mut Value) {
    mask_path(value, &["prediction", "api_key"]);
    mask_path(value, &["solver", "api_key"]);
    mask_path(value, &["notifications", "catch_webhook"]);
    mask_path(value, &["notifications", "challenge_webhook"]);
    mask_array_elements(value, &["notifications", "mirror_webhooks"]);

    if let Some(accounts) = value.pointer_mut("/accounts").and_then(Value::as_array_mut) {
        for account in accounts.iter_mut() {
            mask_path(account, &["credential"]);
        }
    }
}

/// Walk a path into a JSON value and replace the leaf with MASKED,
/// but only if the leaf is a non-null string.
fn mask_path(value: &mut Value, segments: &[&str]) {
    let Some((leaf_key, parents)) = segments.split_last() else {
        return;
    };

    let mut current = value;
    for &seg in parents {
        match current.get_mut(seg) {
            Some(child) if child.is_object() => current = child,
            _ => return,
        }
    }

    if current.get(*leaf_key).is_some_and(Value::is_string) {
        current[*leaf_key] = Value::String(MASKED.to_string());
    }
}

/// Mask every string element in an array at the given path.
fn mask_array_elements(value: &mut Value, segments: &[&str]) {
    let mut current = value;
    for &seg in segments {
        match current.get_mut(seg) {
            Some(child) => current = child,
            None => return,
        }
    }

    if let Some(items) = current.as_array_mut() {
        for item in items.iter_mut().filter(|item| item.is_string()) {
            *item = Value::String(MASKED.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_keys_webhooks_and_credentials() {
        let mut value = json!({
            "prediction": { "api_key": "pk", "api_url": "https://predict.example" },
            "solver": { "api_key": "sk" },
            "notifications": {
                "catch_webhook": "https://hooks.example/1/token",
                "challenge_webhook": null,
                "mirror_webhooks": ["https://hooks.example/2/token"]
            },
            "accounts": [
                { "id": "main", "credential": "tok" },
                { "id": "alt" }
            ]
        });

        mask_config_secrets(&mut value);

        assert_eq!(value["prediction"]["api_key"], MASKED);
        assert_eq!(value["prediction"]["api_url"], "https://predict.example");
        assert_eq!(value["solver"]["api_key"], MASKED);
        assert_eq!(value["notifications"]["catch_webhook"], MASKED);
        assert!(value["notifications"]["challenge_webhook"].is_null());
        assert_eq!(value["notifications"]["mirror_webhooks"][0], MASKED);
        assert_eq!(value["accounts"][0]["credential"], MASKED);
        assert!(value["accounts"][1].get("credential").is_none());
    }

    #[test]
    fn missing_sections_are_ignored() {
        let mut value = json!({ "catching": { "min_delay_ms": 1000 } });
        mask_config_secrets(&mut value);
        assert_eq!(value, json!({ "catching": { "min_delay_ms": 1000 } }));
    }
}
