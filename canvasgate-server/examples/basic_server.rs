//! Basic canvas application behind the gate.
//!
//! Reads the application from `CANVASGATE_APP_ID`, `CANVASGATE_APP_SECRET`,
//! `CANVASGATE_CANVAS_URL` and optionally `CANVASGATE_SCOPES`, then checks
//! granted permissions against the Graph API.
//!
//! Run with:
//! ```sh
//! CANVASGATE_APP_ID=123 CANVASGATE_APP_SECRET=secret \
//! CANVASGATE_CANVAS_URL=https://apps.facebook.com/myapp/ \
//! CANVASGATE_SCOPES=email,publish_stream \
//!   cargo run -p canvasgate-server --example basic_server --features graph
//! ```
//!
//! Point the application's canvas URL at `http://localhost:3000/canvas` and
//! its page tab URL at `http://localhost:3000/tab`.

use axum::routing::{get, post};
use canvasgate_core::{ApplicationConfig, ContextType, LogHook, Pipeline, Requirements};
use canvasgate_server::{GateContext, GateRouter};

async fn canvas(GateContext(authorized): GateContext) -> String {
    let user = authorized
        .context()
        .and_then(|c| c.user())
        .and_then(|u| u.id.clone())
        .unwrap_or_else(|| "someone".to_string());
    format!("Welcome to the canvas, {}", user)
}

async fn tab() -> &'static str {
    "Page settings (admins only)"
}

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ApplicationConfig::from_env()?;
    let scopes = config.scopes().to_vec();

    let pipeline = Pipeline::builder(config).hook(LogHook).build()?;

    let app = GateRouter::new(pipeline)
        .route(
            "/canvas",
            post(canvas),
            Requirements::none()
                .contexts([ContextType::Canvas])
                .authorization()
                .permissions(scopes),
        )
        .route(
            "/tab",
            post(tab),
            Requirements::none().contexts([ContextType::Tab]).page_admin(),
        )
        .route("/health", get(health), Requirements::none())
        .with_login("/login")
        .redirect_unauthorized(true)
        .build()?;

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    println!("Server running at http://localhost:3000");
    println!("Canvas endpoint: POST http://localhost:3000/canvas");
    println!("Tab endpoint: POST http://localhost:3000/tab");

    axum::serve(listener, app).await?;

    Ok(())
}
