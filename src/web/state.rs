use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::{
    error::AttendanceError, mailer::Mailer, manager::AttendanceManager, qr::CodeIssuer,
    report::ReportGenerator, settings::Settings, web::error::AppError, web::views,
};

pub struct State {
    pub settings: Settings,
    pub issuer: CodeIssuer,
    pub reports: ReportGenerator,
    pub mailer: Option<Mailer>,
    manager: Mutex<AttendanceManager>,
}

impl State {
    pub fn new(settings: Settings) -> Result<Arc<Self>, AttendanceError> {
        views::load()?;

        let manager = AttendanceManager::connect(&settings.database.url)?;
        let issuer = CodeIssuer::new(&settings.server.base_url, &settings.paths.static_dir);
        let reports = ReportGenerator::new(&settings.paths.reports_dir, &settings.paths.static_dir)?;

        let mailer = settings
            .smtp
            .as_ref()
            .and_then(|smtp| match Mailer::from_settings(smtp) {
                Ok(mailer) => {
                    info!(host = %smtp.host, "registration e-mails enabled");
                    Some(mailer)
                }
                Err(e) => {
                    warn!("Registration e-mails disabled: {e}");
                    None
                }
            });

        Ok(Arc::new(Self {
            settings,
            issuer,
            reports,
            mailer,
            manager: Mutex::new(manager),
        }))
    }

    /// Runs `f` against the attendance store on the blocking thread pool.
    ///
    /// The store is a single SQLite connection, so callers are serialized here.
    pub async fn with_manager<T, F>(self: &Arc<Self>, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&State, &mut AttendanceManager) -> Result<T, AttendanceError> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(self);

        tokio::task::spawn_blocking(move || {
            let mut manager = state.manager.lock().map_err(|_| AppError::Poisoned)?;
            f(state.as_ref(), &mut manager).map_err(AppError::from)
        })
        .await?
    }
}
