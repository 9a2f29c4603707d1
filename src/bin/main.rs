#[cfg(not(target_arch = "wasm32"))]
mod native {
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use flock::config;
    use flock::core::db::{seed_demo_data, Db};
    use tracing::{error, info};
    use tracing_subscriber::EnvFilter;

    mod adapter {
        use actix_web::HttpRequest;
        use spin_sdk::http::{Method, Request};

        pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> Request {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                other => Method::Other(other.to_string()),
            };

            let uri = req.uri().to_string();
            let mut builder = Request::builder();
            builder.method(method).uri(&uri);
            for (name, value) in req.headers() {
                if let Ok(value) = value.to_str() {
                    builder.header(name.as_str(), value);
                }
            }
            builder.body(body.to_vec()).build()
        }

        pub fn spin_to_actix_response(spin_resp: spin_sdk::http::Response) -> actix_web::HttpResponse {
            let status = actix_web::http::StatusCode::from_u16(*spin_resp.status())
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
            actix_web::HttpResponse::build(status)
                .content_type("application/json")
                .body(spin_resp.body().to_vec())
        }
    }

    fn init_tracing() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    pub async fn run() -> anyhow::Result<()> {
        init_tracing();

        let path = config::database_path();
        let db = Db::open(&path)?;
        info!(path = %path, "database opened");

        if config::seed_demo_data() {
            seed_demo_data(&db)?;
        }

        let addr = config::bind_address();
        info!(addr = %addr, "server listening");

        let data = web::Data::new(db);
        HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .default_service(web::route().to(handle_all))
        })
        .bind(&addr)?
        .run()
        .await?;
        Ok(())
    }

    async fn handle_all(db: web::Data<Db>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
        let spin_req = adapter::actix_to_spin_request(&req, body);
        let db = db.get_ref().clone();

        // The store is synchronous; keep it off the async workers.
        match web::block(move || flock::handle_request(&db, spin_req)).await {
            Ok(resp) => adapter::spin_to_actix_response(resp),
            Err(e) => {
                error!(error = %e, "request handler failed");
                HttpResponse::InternalServerError()
                    .json(serde_json::json!({ "success": false, "error": "Internal server error" }))
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
