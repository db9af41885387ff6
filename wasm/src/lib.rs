// swpush-wasm: WebAssembly bindings for the page and the service worker

#[cfg(target_arch = "wasm32")]
pub mod listeners;
#[cfg(target_arch = "wasm32")]
pub mod page;
#[cfg(target_arch = "wasm32")]
pub mod worker;

use swpush_core::{decode_vapid_key, PushError};
#[cfg(target_arch = "wasm32")]
use swpush_core::{ClientConfig, HostError};
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsCast;

#[wasm_bindgen]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
}

/// Decode a URL-safe base64 VAPID key into the bytes `PushManager` expects.
#[wasm_bindgen(js_name = decodeVapidKey)]
pub fn decode_vapid_key_js(key: &str) -> Result<Vec<u8>, JsValue> {
    decode_vapid_key(key).map_err(|e| to_js_error(PushError::from(e)))
}

/// Read the config object injected into the page or worker.
#[cfg(target_arch = "wasm32")]
pub(crate) fn parse_config(value: JsValue) -> Result<ClientConfig, JsValue> {
    let config: ClientConfig = if value.is_undefined() || value.is_null() {
        ClientConfig::default()
    } else {
        serde_wasm_bindgen::from_value(value)
            .map_err(|e| JsValue::from_str(&format!("Invalid configuration: {}", e)))?
    };
    Ok(config)
}

pub(crate) fn to_js_error(err: PushError) -> JsValue {
    JsValue::from_str(&format!("{}: {}", err.kind(), err))
}

/// Turn a rejected promise or thrown value into a host error.
#[cfg(target_arch = "wasm32")]
pub(crate) fn js_error(operation: &str, err: JsValue) -> HostError {
    let detail = err
        .as_string()
        .or_else(|| {
            err.dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| format!("{:?}", err));
    HostError::new(format!("{} failed: {}", operation, detail))
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_decode_vapid_key_js() {
        let bytes = decode_vapid_key_js(
            "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U",
        )
        .unwrap();
        assert_eq!(bytes.len(), 65);
        assert!(decode_vapid_key_js("a").is_err());
    }

    #[wasm_bindgen_test]
    fn test_missing_config_uses_defaults() {
        let config = parse_config(JsValue::UNDEFINED).unwrap();
        assert_eq!(config.worker_script, "/sw.js");
    }
}
