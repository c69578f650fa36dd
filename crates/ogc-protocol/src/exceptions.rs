//! Error message extraction from service responses.
//!
//! Services report failures in several shapes:
//! - OGC `ServiceExceptionReport` / OWS `ExceptionReport` XML documents
//! - ArcGIS JSON with an `error.message` member
//! - plain text or HTML

use quick_xml::events::Event;
use quick_xml::Reader;

/// Pull the most useful human-readable message out of an error body.
///
/// For XML the last child of the root element is inspected; its first child's
/// text is preferred (OWS `Exception/ExceptionText`), otherwise its own text
/// (WMS `ServiceException`). Bodies that are neither XML nor JSON are returned
/// trimmed.
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        if let Some(message) = json_message(trimmed) {
            return message;
        }
    }
    if trimmed.starts_with('<') {
        if let Some(message) = xml_message(trimmed) {
            return message;
        }
    }
    trimmed.to_string()
}

/// True for bodies that are OGC exception reports. WMS servers often send
/// these with a 200 status.
pub fn is_exception_report(body: &[u8]) -> bool {
    let head = &body[..body.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start();
    text.starts_with('<') && (text.contains("ServiceExceptionReport") || text.contains("ExceptionReport"))
}

fn json_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(|m| m.trim().to_string())
}

/// Text collected for the current last child of the root.
#[derive(Default)]
struct LastChild {
    own_text: String,
    first_child_text: Option<String>,
}

fn xml_message(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut capturing = false;
    let mut last: Option<LastChild> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => {
                depth += 1;
                enter_element(depth, &mut saw_root, &mut last, &mut capturing);
            }
            Ok(Event::Empty(_)) => {
                enter_element(depth + 1, &mut saw_root, &mut last, &mut capturing);
                capturing = false;
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().ok()?.into_owned();
                collect_text(&mut last, depth, capturing, &text);
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                collect_text(&mut last, depth, capturing, &text);
            }
            Ok(Event::End(_)) => {
                if depth == 3 {
                    capturing = false;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return None;
    }
    let child = last?;
    let message = child
        .first_child_text
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(child.own_text);
    Some(message.trim().to_string())
}

fn enter_element(
    depth: usize,
    saw_root: &mut bool,
    last: &mut Option<LastChild>,
    capturing: &mut bool,
) {
    match depth {
        1 => *saw_root = true,
        2 => *last = Some(LastChild::default()),
        3 => {
            // only the first grandchild is read
            if let Some(child) = last.as_mut() {
                if child.first_child_text.is_none() {
                    child.first_child_text = Some(String::new());
                    *capturing = true;
                }
            }
        }
        _ => {}
    }
}

fn collect_text(last: &mut Option<LastChild>, depth: usize, capturing: bool, text: &str) {
    let Some(child) = last.as_mut() else {
        return;
    };
    match depth {
        2 => child.own_text.push_str(text),
        3 if capturing => {
            if let Some(first) = child.first_child_text.as_mut() {
                first.push_str(text);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wms_service_exception() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<ServiceExceptionReport version="1.3.0" xmlns="http://www.opengis.net/ogc">
  <ServiceException code="InvalidCRS">
    Invalid CRS: EPSG:9999
  </ServiceException>
</ServiceExceptionReport>"#;
        assert_eq!(extract_error_message(body), "Invalid CRS: EPSG:9999");
    }

    #[test]
    fn test_ows_exception_text() {
        let body = r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/1.1">
  <ows:Exception exceptionCode="InvalidParameterValue" locator="typeName">
    <ows:ExceptionText>Feature type unknown</ows:ExceptionText>
  </ows:Exception>
</ows:ExceptionReport>"#;
        assert_eq!(extract_error_message(body), "Feature type unknown");
    }

    #[test]
    fn test_last_exception_wins() {
        let body = "<Report><E>first</E><E>second</E></Report>";
        assert_eq!(extract_error_message(body), "second");
    }

    #[test]
    fn test_arcgis_json_error() {
        let body = r#"{"error": {"code": 400, "message": "Invalid query parameters", "details": []}}"#;
        assert_eq!(extract_error_message(body), "Invalid query parameters");
    }

    #[test]
    fn test_is_exception_report() {
        assert!(is_exception_report(
            br#"<?xml version="1.0"?><ServiceExceptionReport><ServiceException>x</ServiceException></ServiceExceptionReport>"#
        ));
        assert!(!is_exception_report(b"\x89PNG\r\n"));
        assert!(!is_exception_report(b"<html><body>ok</body></html>"));
    }

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(extract_error_message("  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(extract_error_message("{not json"), "{not json");
    }
}
