//! Format-specific response decoders.
//!
//! The quote portals answer in JSONP envelopes, `var hq_str_...="..."` quote
//! strings, tilde-joined Tencent records, and raw HTML tables. Every decoder
//! here is total: unparseable input yields an empty result, never a panic.
//! All scanning is ASCII-safe and independent of host locale.

pub mod sse;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

/// Strip a JSONP envelope `name( ... )` (optionally `);`-terminated) and
/// parse the inner JSON. Returns `None` when no balanced payload is found.
pub fn strip_jsonp(body: &str) -> Option<Value> {
    let body = body.trim();

    // Plain JSON passes through unwrapped.
    if body.starts_with('{') || body.starts_with('[') {
        return serde_json::from_str(body).ok();
    }

    let open = body.find('(')?;
    // The callback name must look like an identifier, not arbitrary junk.
    let name = body[..open].trim();
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
    {
        return None;
    }

    let close = body.rfind(')')?;
    if close <= open {
        return None;
    }
    serde_json::from_str(body[open + 1..close].trim()).ok()
}

/// One record from a Sina-style quote response:
/// `var hq_str_sh600519="贵州茅台,1688.00,...";`
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedRecord {
    /// The `<code>` portion of the variable name, e.g. `sh600519`.
    pub code: String,
    pub fields: Vec<String>,
}

lazy_static! {
    // `$` appears in US ticker tags like `hq_str_gb_brk$b`.
    static ref SINA_LINE: Regex =
        Regex::new(r#"var\s+hq_str_([A-Za-z0-9_$]+)\s*=\s*"([^"]*)""#).unwrap();
    static ref TENCENT_LINE: Regex =
        Regex::new(r#"v_([A-Za-z0-9_]+)\s*=\s*"([^"]*)""#).unwrap();
    static ref TAG_STRIP: Regex =
        Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<!--.*?-->").unwrap();
    static ref TR_RE: Regex = Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").unwrap();
    static ref TD_RE: Regex = Regex::new(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"(?s)<[^>]+>").unwrap();
}

/// Parse every `var hq_str_<code>="<csv>";` line, comma-splitting the body.
/// Records with an empty body (delisted or unknown codes) are skipped.
pub fn parse_sina_vars(body: &str) -> Vec<TaggedRecord> {
    SINA_LINE
        .captures_iter(body)
        .filter_map(|cap| {
            let csv = cap.get(2)?.as_str();
            if csv.is_empty() {
                return None;
            }
            Some(TaggedRecord {
                code: cap.get(1)?.as_str().to_string(),
                fields: csv.split(',').map(|s| s.trim().to_string()).collect(),
            })
        })
        .collect()
}

/// Parse every `v_<code>="<v1>~<v2>~...";` line, tilde-splitting the body.
pub fn parse_tencent_vars(body: &str) -> Vec<TaggedRecord> {
    TENCENT_LINE
        .captures_iter(body)
        .filter_map(|cap| {
            let joined = cap.get(2)?.as_str();
            if joined.is_empty() {
                return None;
            }
            Some(TaggedRecord {
                code: cap.get(1)?.as_str().to_string(),
                fields: joined.split('~').map(|s| s.trim().to_string()).collect(),
            })
        })
        .collect()
}

/// The curated entity set the portals actually emit.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&middot;", "·")
        .replace("&mdash;", "—")
        .replace("&ldquo;", "“")
        .replace("&rdquo;", "”")
        .replace("&amp;", "&")
}

/// Scrape an HTML table into rows of cell text.
///
/// Strips scripts, styles and comments first, then walks `<tr>`/`<td>`
/// (accepting `<th>` header cells), flattening nested markup inside each
/// cell. Rows with no cells are dropped.
pub fn scrape_table(html: &str) -> Vec<Vec<String>> {
    let cleaned = TAG_STRIP.replace_all(html, "");
    TR_RE
        .captures_iter(&cleaned)
        .filter_map(|row| {
            let inner = row.get(1)?.as_str();
            let cells: Vec<String> = TD_RE
                .captures_iter(inner)
                .filter_map(|cell| {
                    let raw = cell.get(1)?.as_str();
                    let text = ANY_TAG.replace_all(raw, "");
                    Some(decode_entities(text.trim()))
                })
                .collect();
            if cells.is_empty() {
                None
            } else {
                Some(cells)
            }
        })
        .collect()
}

/// Field accessor helpers for positional CSV/tilde records. Out-of-range or
/// malformed fields degrade to the type default instead of failing the row.
impl TaggedRecord {
    pub fn str_at(&self, idx: usize) -> &str {
        self.fields.get(idx).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn f64_at(&self, idx: usize) -> f64 {
        self.fields
            .get(idx)
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    pub fn i64_at(&self, idx: usize) -> i64 {
        self.fields
            .get(idx)
            .and_then(|s| s.parse::<f64>().ok())
            .map(|v| v as i64)
            .unwrap_or(0)
    }
}

/// Walk a JSON path like `data.diff` from a root value.
pub fn json_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for part in path.split('.') {
        cur = match cur {
            Value::Object(map) => map.get(part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonp_strip_round_trips_balanced_payloads() {
        let wrapped = r#"jQuery18301234({"rc":0,"data":{"total":2}});"#;
        let value = strip_jsonp(wrapped).unwrap();
        assert_eq!(value["data"]["total"], 2);

        // Nested parens inside strings survive because we take the last ')'.
        let tricky = r#"cb({"name":"foo (bar)","n":1})"#;
        let value = strip_jsonp(tricky).unwrap();
        assert_eq!(value["name"], "foo (bar)");

        // Plain JSON is accepted unwrapped.
        let plain = r#"{"ok":true}"#;
        assert_eq!(strip_jsonp(plain).unwrap()["ok"], true);
    }

    #[test]
    fn jsonp_strip_rejects_garbage() {
        assert!(strip_jsonp("").is_none());
        assert!(strip_jsonp("<html>502 Bad Gateway</html>").is_none());
        assert!(strip_jsonp("cb(not json)").is_none());
    }

    #[test]
    fn sina_var_lines_parse() {
        let body = concat!(
            "var hq_str_sh600519=\"贵州茅台,1688.00,1690.00,1695.50,1700.00,1680.00\";\n",
            "var hq_str_sz000001=\"平安银行,10.50,10.40,10.55,10.60,10.30\";\n",
            "var hq_str_sh999999=\"\";\n",
        );
        let records = parse_sina_vars(body);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "sh600519");
        assert_eq!(records[0].str_at(0), "贵州茅台");
        assert_eq!(records[0].f64_at(3), 1695.50);
        assert_eq!(records[1].code, "sz000001");
        // Out-of-range access degrades, not panics.
        assert_eq!(records[0].f64_at(99), 0.0);
    }

    #[test]
    fn tencent_tilde_lines_parse() {
        let body = "v_sh600519=\"1~贵州茅台~600519~1688.00~1690.00~1692.00\";\nv_pv_none=\"\";";
        let records = parse_tencent_vars(body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].code, "sh600519");
        assert_eq!(records[0].str_at(1), "贵州茅台");
        assert_eq!(records[0].f64_at(3), 1688.00);
    }

    #[test]
    fn table_scrape_drops_script_and_decodes_entities() {
        let html = r#"
            <html><head><style>tr { color: red }</style></head>
            <body>
            <script>var x = "<tr><td>fake</td></tr>";</script>
            <!-- comment <tr><td>ghost</td></tr> -->
            <table><tbody>
              <tr><td>中国&middot;平安</td><td><b>10.55</b></td><td>+1.2%</td></tr>
              <tr><td>招商银行&nbsp;</td><td>35.10</td><td>-0.8%</td></tr>
              <tr></tr>
            </tbody></table>
            </body></html>"#;
        let rows = scrape_table(html);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["中国·平安", "10.55", "+1.2%"]);
        assert_eq!(rows[1][0], "招商银行");
    }

    #[test]
    fn table_scrape_is_total_on_garbage() {
        assert!(scrape_table("").is_empty());
        assert!(scrape_table("no tables here").is_empty());
        assert!(scrape_table("<tr><td>unclosed").is_empty());
    }

    #[test]
    fn json_path_walks_objects_and_arrays() {
        let v: Value =
            serde_json::from_str(r#"{"data":{"diff":[{"f2":1688.0},{"f2":10.5}]}}"#).unwrap();
        assert_eq!(json_path(&v, "data.diff.1.f2").unwrap().as_f64(), Some(10.5));
        assert!(json_path(&v, "data.missing").is_none());
    }
}
