//! Crockford-compatible base32, no padding (spec §6).

use data_encoding::Specification;
use std::sync::OnceLock;

fn crockford() -> &'static data_encoding::Encoding {
    static ENCODING: OnceLock<data_encoding::Encoding> = OnceLock::new();
    ENCODING.get_or_init(|| {
        let mut spec = Specification::new();
        spec.symbols.push_str("0123456789ABCDEFGHJKMNPQRSTVWXYZ");
        spec.padding = None;
        spec.translate.from.push_str("oOiIlL");
        spec.translate.to.push_str("001111");
        spec.encoding().expect("crockford base32 spec is valid")
    })
}

pub fn encode(bytes: &[u8]) -> String {
    crockford().encode(bytes)
}

pub fn decode(s: &str) -> Result<Vec<u8>, ()> {
    crockford().decode(s.to_ascii_uppercase().as_bytes()).map_err(|_| ())
}
