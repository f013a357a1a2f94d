use crate::core::error::RfidError;
use crate::stores::card_table::CardTable;

const OPEN: &str = "{\"cards\":[";
const CLOSE: &str = "]}";

/// Render live cards as `{"cards":[{"id":"0x..","nm":"..","ts":..},...]}`
///
/// The output never exceeds `capacity` bytes. Room for each element and the
/// closing brackets is checked before anything is appended, and the whole
/// render fails instead of returning a truncated document.
pub fn render_cards(table: &CardTable, capacity: usize) -> Result<String, RfidError> {
    if capacity < OPEN.len() + CLOSE.len() {
        return Err(RfidError::RenderOverflow {
            needed: OPEN.len() + CLOSE.len(),
            capacity,
        });
    }

    let mut out = String::with_capacity(capacity.min(4096));
    out.push_str(OPEN);

    let mut element = String::with_capacity(96);
    let mut numbers = itoa::Buffer::new();

    for (index, card) in table.live().enumerate() {
        element.clear();
        if index > 0 {
            element.push(',');
        }
        element.push_str("{\"id\":\"0x");
        element.push_str(&format!("{:X}", card.id));
        element.push_str("\",\"nm\":");
        // serde_json handles quoting and escaping of the holder name
        element.push_str(
            &serde_json::to_string(&card.name.to_string_lossy())
                .map_err(|_| RfidError::InvalidArgument("card name cannot be encoded"))?,
        );
        element.push_str(",\"ts\":");
        element.push_str(numbers.format(card.last_seen));
        element.push('}');

        let needed = out.len() + element.len() + CLOSE.len();
        if needed > capacity {
            return Err(RfidError::RenderOverflow { needed, capacity });
        }
        out.push_str(&element);
    }

    out.push_str(CLOSE);
    Ok(out)
}
