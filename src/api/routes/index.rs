//! Index Route
//!
//! - GET / - Status page listing the endpoints and the live client count

use axum::{extract::State, response::Html};
use std::sync::Arc;

use crate::api::state::AppState;

/// GET /
pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let server = &state.config.server;
    Html(render_index(server.port, &server.ws_path))
}

fn render_index(port: u16, ws_path: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Parking Hub</title>
    <style>
        body {{ font-family: Arial, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }}
        .status {{ padding: 10px; background: #e7f3e7; border-left: 4px solid #4caf50; margin: 20px 0; }}
        .endpoint {{ background: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 4px; }}
        code {{ background: #333; color: #fff; padding: 2px 6px; border-radius: 3px; }}
    </style>
</head>
<body>
    <h1>Parking Hub</h1>
    <div class="status"><strong>Status:</strong> running</div>
    <h2>Endpoints</h2>
    <div class="endpoint"><strong>WebSocket:</strong> <code>ws://localhost:{port}{ws_path}</code></div>
    <div class="endpoint"><strong>Health:</strong> <code>http://localhost:{port}/health</code></div>
    <h2>Connected clients</h2>
    <p id="clients">Loading...</p>
    <script>
        fetch('/health')
            .then(r => r.json())
            .then(data => {{
                document.getElementById('clients').textContent = data.clients + ' client(s) connected';
            }});
    </script>
</body>
</html>
"#,
        port = port,
        ws_path = ws_path,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_index_names_endpoints() {
        let page = render_index(9000, "/live");
        assert!(page.contains("ws://localhost:9000/live"));
        assert!(page.contains("http://localhost:9000/health"));
    }
}
