//! Home page handler
//!
//! Renders the input form. Each model feature becomes a field labelled
//! with its reference range; the page posts JSON to `/predict` and shows
//! the response.

use std::fmt::Write;

use axum::{extract::State, response::Html};

use crate::inference::ModelMetadata;
use crate::AppState;

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_index(&state.metadata, state.model_loaded()))
}

pub fn render_index(metadata: &ModelMetadata, model_loaded: bool) -> String {
    let mut fields = String::new();
    for feature in &metadata.features {
        let name = escape_html(feature);
        let hint = match metadata.reference_ranges.get(feature) {
            Some(range) => {
                let unit = metadata.unit(feature);
                let unit = if unit.is_empty() { String::new() } else { format!(" {}", escape_html(unit)) };
                format!("Normal: {} – {}{}", range.low(), range.high(), unit)
            }
            None => String::new(),
        };
        let _ = write!(
            fields,
            r#"      <label>{name}<input name="{name}" required><small>{hint}</small></label>
"#
        );
    }

    let notice = if model_loaded {
        ""
    } else {
        r#"    <p class="notice">The model is not loaded. Predictions are unavailable; check the server logs.</p>
"#
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Anemia Classification</title>
  <style>
    body {{ font-family: sans-serif; max-width: 40rem; margin: 2rem auto; }}
    label {{ display: block; margin: .5rem 0; }}
    input {{ margin-left: .5rem; }}
    small {{ margin-left: .5rem; color: #666; }}
    .notice {{ color: #a00; }}
    pre {{ background: #f4f4f4; padding: 1rem; }}
  </style>
</head>
<body>
  <h1>Anemia Classification</h1>
{notice}  <form id="cbc">
{fields}    <button type="submit">Predict</button>
  </form>
  <pre id="result"></pre>
  <script>
    document.getElementById("cbc").addEventListener("submit", async (event) => {{
      event.preventDefault();
      const data = Object.fromEntries(new FormData(event.target));
      const response = await fetch("/predict", {{
        method: "POST",
        headers: {{ "Content-Type": "application/json" }},
        body: JSON.stringify(data)
      }});
      document.getElementById("result").textContent =
        JSON.stringify(await response.json(), null, 2);
    }});
  </script>
</body>
</html>
"#
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use axum::http::StatusCode;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_render_lists_parameters() {
        let mut metadata = ModelMetadata::fallback();
        metadata.units.insert("HGB".into(), "g/dL".into());

        let html = render_index(&metadata, true);
        for feature in &metadata.features {
            assert!(html.contains(&format!(r#"name="{}""#, feature)));
        }
        assert!(html.contains("Normal: 12 – 16 g/dL"));
        assert!(!html.contains("not loaded"));
    }

    #[test]
    fn test_render_escapes_metadata() {
        let mut metadata = ModelMetadata::fallback();
        metadata.features.push("<script>".into());

        let html = render_index(&metadata, false);
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("The model is not loaded"));
    }

    #[tokio::test]
    async fn test_index_route() {
        let (status, body) = send(degraded_app(), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<form id=\"cbc\">"));
        assert!(body.contains("The model is not loaded"));
    }
}
