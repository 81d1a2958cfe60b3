use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use mosaic_common::channel::Snapshot;
use std::fmt::Write as _;

const HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="30">
<title>Mosaic</title>
<style>
body { margin: 0; background: #111; color: #ddd; font: 12px sans-serif; }
.grid { display: flex; flex-wrap: wrap; gap: 4px; padding: 4px; }
.tile { width: 160px; }
.tile img, .tile .placeholder { display: block; width: 160px; height: 100px; }
.placeholder { background: #333; color: #777; line-height: 100px; text-align: center; }
.name { overflow: hidden; white-space: nowrap; text-overflow: ellipsis; padding: 2px 0; }
.status { padding: 4px 8px; color: #888; }
</style>
</head>
<body>
"#;

const TAIL: &str = "</body>\n</html>\n";

/// Render the thumbnail wall for one snapshot, one tile per channel in snapshot order.
pub fn render(snapshot: &Snapshot) -> String {
    let mut html = String::with_capacity(HEAD.len() + snapshot.len() * 512);
    html.push_str(HEAD);

    match snapshot.completed_at {
        Some(at) => {
            let _ = writeln!(
                html,
                "<div class=\"status\">cycle {} at {}: {} of {} channels captured</div>",
                snapshot.cycle,
                at.format("%Y-%m-%d %H:%M:%S UTC"),
                snapshot.captured_count(),
                snapshot.len()
            );
        }
        None => html.push_str("<div class=\"status\">waiting for the first refresh</div>\n"),
    }

    html.push_str("<div class=\"grid\">\n");
    for result in &snapshot.results {
        let name = escape(&result.name);
        html.push_str("<div class=\"tile\">");
        match &result.image_data {
            Some(data) => {
                let _ = write!(
                    html,
                    "<img src=\"data:image/png;base64,{}\" alt=\"{name}\">",
                    STANDARD.encode(data)
                );
            }
            None => html.push_str("<div class=\"placeholder\">no signal</div>"),
        }
        let _ = writeln!(html, "<div class=\"name\" title=\"{name}\">{name}</div></div>");
    }
    html.push_str("</div>\n");

    html.push_str(TAIL);
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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
