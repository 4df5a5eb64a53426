use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use qse_fiche_server::config::Config;
use qse_fiche_server::excel::template::{TemplateRegistry, TemplateState};
use qse_fiche_server::mailer::{MailTransport, SmtpMailer};
use qse_fiche_server::services::FicheLocks;
use qse_fiche_server::storage::ArtifactStore;
use qse_fiche_server::{database, routes};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("configuration invalide: {err}");
            std::process::exit(1);
        }
    };

    let db = database::connect(&config.mongodb_uri, &config.db_name)
        .await
        .expect("Failed to connect to database");
    info!(db = %config.db_name, "connexion MongoDB établie");

    let store = ArtifactStore::open(&config.files_dir).expect("Failed to open files directory");

    // Loaded once per process. A missing template keeps the server up;
    // every render then fails with TemplateMissing.
    let registry = match TemplateRegistry::load(&config.template_path) {
        Ok(registry) => {
            info!(template = %config.template_path.display(), "template Excel chargé");
            Some(registry)
        }
        Err(err) => {
            warn!("template Excel indisponible: {err}");
            None
        }
    };

    let db = web::Data::new(db);
    let template = web::Data::new(TemplateState::new(config.template_path.clone(), registry));
    let store = web::Data::new(store);
    let locks = web::Data::new(FicheLocks::new());
    let transport: web::Data<dyn MailTransport> =
        web::Data::from(Arc::new(SmtpMailer) as Arc<dyn MailTransport>);

    let address = config.bind_address();
    info!(host = %address.0, port = address.1, "démarrage du serveur");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(db.clone())
            .app_data(template.clone())
            .app_data(store.clone())
            .app_data(locks.clone())
            .app_data(transport.clone())
            .service(
                web::scope("/api")
                    .service(routes::root)
                    .service(routes::user::create_user)
                    .service(routes::user::login)
                    .service(routes::user::get_users)
                    .service(routes::user::get_user)
                    .service(routes::fiche::create_fiche)
                    .service(routes::fiche::get_fiches)
                    .service(routes::fiche::get_fiche)
                    .service(routes::fiche::update_fiche)
                    .service(routes::fiche::delete_fiche)
                    .service(routes::fiche::validate_fiche)
                    .service(routes::fiche::download_excel)
                    .service(routes::fiche::send_fiche_email)
                    .service(routes::fiche::sync_fiches)
                    .service(routes::fiche::get_stats)
                    .service(routes::settings::get_config)
                    .service(routes::settings::update_config)
                    .service(routes::settings::get_email_config)
                    .service(routes::settings::update_email_config),
            )
    })
    .bind(address)?
    .run()
    .await
}
