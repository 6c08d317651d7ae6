//! HTML fragments served by the gateway.

pub(crate) const INDEX: &str = "<a href='kinesis'>kinesis</a>";

const LINE_BREAK: &str = "<br/>";
const RECORD_BREAK: &str = "<br/><br/>";

/// Escape text for use in element content and single or double quoted
/// attributes
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn link(href: &str, label: &str) -> String {
    format!("<a href='{href}'>{}</a>", escape_html(label))
}

/// Links relative to `/kinesis`
pub(crate) fn stream_links(stream_names: &[String]) -> String {
    stream_names
        .iter()
        .map(|name| link(&format!("kinesis/{}", urlencoding::encode(name)), name))
        .collect::<Vec<_>>()
        .join(LINE_BREAK)
}

pub(crate) fn shard_links(stream_name: &str, shard_ids: &[String]) -> String {
    let stream = urlencoding::encode(stream_name);
    shard_ids
        .iter()
        .map(|id| {
            let href = format!("/kinesis/{stream}/{}", urlencoding::encode(id));
            link(&href, id)
        })
        .collect::<Vec<_>>()
        .join(LINE_BREAK)
}

pub(crate) fn records(records: &[String]) -> String {
    records
        .iter()
        .map(|record| escape_html(record))
        .collect::<Vec<_>>()
        .join(RECORD_BREAK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("plain"), "plain");
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_stream_links() {
        let names = vec!["orders".to_string(), "click stream".to_string()];
        assert_eq!(
            stream_links(&names),
            "<a href='kinesis/orders'>orders</a><br/>\
             <a href='kinesis/click%20stream'>click stream</a>"
        );
        assert_eq!(stream_links(&[]), "");
    }

    #[test]
    fn test_shard_links() {
        let ids = vec!["shard-000".to_string(), "shard-001".to_string()];
        assert_eq!(
            shard_links("orders", &ids),
            "<a href='/kinesis/orders/shard-000'>shard-000</a><br/>\
             <a href='/kinesis/orders/shard-001'>shard-001</a>"
        );
    }

    #[test]
    fn test_records_are_escaped_and_separated() {
        let records = vec!["<b>a</b>".to_string(), "b".to_string()];
        assert_eq!(super::records(&records), "&lt;b&gt;a&lt;/b&gt;<br/><br/>b");
    }
}
