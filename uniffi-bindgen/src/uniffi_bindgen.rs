//! Generates Swift and Kotlin bindings for the `seedkit` library.

fn main() {
    uniffi::uniffi_bindgen_main();
}
