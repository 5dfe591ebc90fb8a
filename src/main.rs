use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "server")] {
        use dotenv::dotenv;
        use env_logger::Env;
        use ai_chat::config;
        use ai_chat::handlers::router;
        use ai_chat::state::AppState;

        async fn shutdown_signal() {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
            }
            log::info!("Shutting down");
        }

        #[tokio::main]
        async fn main() -> anyhow::Result<()> {
            dotenv().ok();
            env_logger::init_from_env(Env::default().default_filter_or("info"));

            let addr = config::server_addr();
            let app = router(AppState::from_env());

            log::info!("Starting server at {}", addr);

            let listener = tokio::net::TcpListener::bind(&addr).await?;
            log::info!("listening on http://{}", &addr);
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            Ok(())
        }
    } else {
        pub fn main() {
            // no server without the `server` feature
            // the library still exposes the message parser
        }
    }
}
