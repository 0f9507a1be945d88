// src/application/commands/db_commands.rs

use crate::application::{dto::DatabaseReportDto, state::AppState};
use crate::db::{get_database_stats, verify_database_integrity};
use crate::error::AppResult;

pub fn database_report(state: &AppState) -> AppResult<DatabaseReportDto> {
    let conn = state.pool.get()?;
    let integrity_ok = match verify_database_integrity(&conn) {
        Ok(()) => true,
        Err(e) => {
            log::error!("Integrity check failed: {}", e);
            false
        }
    };
    let stats = get_database_stats(&conn)?;
    Ok(DatabaseReportDto { integrity_ok, stats })
}
