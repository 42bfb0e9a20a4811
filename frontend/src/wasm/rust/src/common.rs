// Import the `console.log` function from the browser
#[wasm_bindgen::prelude::wasm_bindgen]
extern "C" {
    #[wasm_bindgen::prelude::wasm_bindgen(js_namespace = console)]
    pub fn log(s: &str);
}

// console.log with format! arguments
#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => ($crate::common::log(&format_args!($($t)*).to_string()))
}

/// Milliseconds since `start`, from the host clock.
pub fn elapsed_ms(start: f64) -> f64 {
    js_sys::Date::now() - start
}
