//! Foreign asset helpers

use serde_json::{Map, Value};

use crate::common::{Error, Result};

/// Precompile prefix for foreign asset contracts
const ASSET_ADDRESS_PREFIX: &str = "0xffffffff";

/// Decimals of a relative price
const RELATIVE_PRICE_DECIMALS: u32 = 18;

/// Contract address of a foreign asset: prefix plus the id as 16 bytes
pub fn asset_contract_address(asset_id: u128) -> String {
    format!("{}{:032x}", ASSET_ADDRESS_PREFIX, asset_id)
}

/// Bring a location JSON value into XCM v4 shape
///
/// Drops an `Xcm` wrapper, unwraps `Concrete` / `Abstract`, and turns
/// junction maps such as `{"X1": {"Parachain": 1000}}` into arrays
/// (`{"X1": [{"Parachain": 1000}]}`).
pub fn patch_location_v4(value: Value) -> Value {
    let value = match value {
        Value::Object(mut map) if map.contains_key("Xcm") => {
            map.remove("Xcm").unwrap_or(Value::Null)
        }
        other => other,
    };

    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(patch_location_v4).collect()),
        Value::Object(mut map) => {
            for wrapper in ["Concrete", "Abstract"] {
                if let Some(inner) = map.remove(wrapper) {
                    return patch_location_v4(inner);
                }
            }
            let patched = map
                .into_iter()
                .map(|(key, inner)| {
                    let inner = match inner {
                        Value::Object(junctions) if is_junction_key(&key) => Value::Array(
                            junctions
                                .into_iter()
                                .map(|(name, v)| {
                                    let mut single = Map::new();
                                    single.insert(name, patch_location_v4(v));
                                    Value::Object(single)
                                })
                                .collect(),
                        ),
                        other => patch_location_v4(other),
                    };
                    (key, inner)
                })
                .collect();
            Value::Object(patched)
        }
        other => other,
    }
}

/// `X1`..`X9` (either case)
fn is_junction_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some('X' | 'x'), Some(d), None) if d.is_ascii_digit()
    )
}

/// Price relative to the native asset with 18 decimals
///
/// `native_per_second * 10^18 / units_per_second`; 0 when the asset has no
/// units per second.
pub fn relative_price(native_per_second: u128, units_per_second: u128) -> Result<u128> {
    if units_per_second == 0 {
        return Ok(0);
    }
    native_per_second
        .checked_mul(10u128.pow(RELATIVE_PRICE_DECIMALS))
        .map(|scaled| scaled / units_per_second)
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "Relative price of {} native per second overflows",
                native_per_second
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_asset_contract_address() {
        assert_eq!(
            asset_contract_address(1),
            "0xffffffff00000000000000000000000000000001"
        );
        assert_eq!(asset_contract_address(0xabcd).len(), 42);
    }

    #[test]
    fn test_patch_location_v4() {
        let legacy = json!({
            "Xcm": {
                "parents": 1,
                "interior": { "X1": { "Parachain": 1000 } }
            }
        });
        assert_eq!(
            patch_location_v4(legacy),
            json!({ "parents": 1, "interior": { "X1": [ { "Parachain": 1000 } ] } })
        );

        let wrapped = json!({ "Concrete": { "parents": 0, "interior": "Here" } });
        assert_eq!(
            patch_location_v4(wrapped),
            json!({ "parents": 0, "interior": "Here" })
        );

        let already = json!({ "interior": { "X2": [ { "Parachain": 1 }, { "PalletInstance": 3 } ] } });
        assert_eq!(patch_location_v4(already.clone()), already);
    }

    #[test]
    fn test_relative_price() {
        assert_eq!(relative_price(5, 0).unwrap(), 0);
        assert_eq!(relative_price(1, 2).unwrap(), 500_000_000_000_000_000);
        assert!(relative_price(u128::MAX, 1).is_err());
    }
}
