use crate::context::App;
use pipeline::{
    CheckOutcome, JobHandle, Scheduler, Trigger, check_curseforge_page, check_modrinth_page, discover_curseforge,
    discover_modrinth, drain_curseforge_queues, drain_modrinth_queues, sync_curseforge_project, sync_modrinth_project,
};
use model::{Platform, Project, ProjectId};
use mongodb::bson::doc;
use notify::{JobSummary, Notifier, ProjectSummaryLine};
use std::sync::Arc;
use store::{Entity, EntityType, ObjectStore};
use tracing::{error, info, warn};

const PAGE_SIZE: i64 = 200;

fn trigger_for(app: &App, job: &str) -> pipeline::Trigger {
    if app.config.use_cron {
        if let Some(expr) = app.config.cron_trigger.get(job) {
            match Trigger::cron(expr) {
                Ok(trigger) => return trigger,
                Err(err) => warn!(job, error = %err, "invalid cron expression, falling back to interval"),
            }
        }
    }
    Trigger::Interval(std::time::Duration::from_secs(app.config.interval_seconds(job)))
}

async fn all_projects(store: &Arc<dyn store::ObjectStore>, ty: EntityType) -> Vec<Project> {
    let mut out = Vec::new();
    let mut skip = 0u64;
    loop {
        let page = match store.find_page(ty, doc! {}, skip, PAGE_SIZE).await {
            Ok(page) => page,
            Err(err) => {
                error!(error = %err, "failed to page stored projects");
                break;
            }
        };
        if page.is_empty() {
            break;
        }
        let len = page.len();
        out.extend(page.into_iter().filter_map(|e| match e {
            Entity::Project(p) => Some(p),
            _ => None,
        }));
        if (len as i64) < PAGE_SIZE {
            break;
        }
        skip += len as u64;
    }
    out
}

enum CurseForgeRefreshOutcome {
    Synced(ProjectSummaryLine),
    Failed,
}

async fn delete_dead_curseforge_project(app: &App, id: i64) {
    if let Err(err) = app
        .store
        .delete_many(EntityType::Project(Platform::CurseForge), doc! { "id": id })
        .await
    {
        warn!(project_id = id, error = %err, "failed to prune dead curseforge project");
    }
    if let Err(err) = app
        .store
        .delete_many(EntityType::VersionOrFile(Platform::CurseForge), doc! { "projectId": id })
        .await
    {
        warn!(project_id = id, error = %err, "failed to prune dead curseforge project's files");
    }
    if let Err(err) = app.store.delete_many(EntityType::Fingerprint, doc! { "modId": id }).await {
        warn!(project_id = id, error = %err, "failed to prune dead curseforge project's fingerprints");
    }
}

async fn run_curseforge_refresh(app: Arc<App>, full: bool) {
    let projects = all_projects(&app.store, EntityType::Project(Platform::CurseForge)).await;
    let mut synced = Vec::new();
    let mut failed = 0usize;
    let mut dead = Vec::new();

    if full {
        let ids: Vec<i64> = projects
            .iter()
            .filter_map(|p| match &p.id {
                ProjectId::CurseForge(id) => Some(*id),
                _ => None,
            })
            .collect();
        let store = app.store.clone();
        let curseforge = app.curseforge.clone();
        let cfg = app.cf_sync_config();
        let outcomes = app
            .curseforge_pool
            .run_all(ids, move |id| {
                let store = store.clone();
                let curseforge = curseforge.clone();
                let cfg = cfg;
                async move {
                    match sync_curseforge_project(store, &curseforge, id, &cfg).await {
                        Ok(detail) => CurseForgeRefreshOutcome::Synced(ProjectSummaryLine {
                            name: detail.name,
                            id: detail.id.to_string(),
                            version_count: detail.version_count,
                        }),
                        Err(err) => {
                            warn!(project_id = id, error = %err, "curseforge full refresh failed");
                            CurseForgeRefreshOutcome::Failed
                        }
                    }
                }
            })
            .await;
        for outcome in outcomes {
            match outcome {
                CurseForgeRefreshOutcome::Synced(line) => synced.push(line),
                CurseForgeRefreshOutcome::Failed => failed += 1,
            }
        }
    } else {
        for chunk in projects.chunks(app.config.curseforge_chunk_size.max(1)) {
            let outcomes = match check_curseforge_page(&app.store, &app.curseforge, chunk).await {
                Ok(outcomes) => outcomes,
                Err(err) => {
                    error!(error = %err, "curseforge checker sweep failed for a page");
                    continue;
                }
            };
            let changed: Vec<i64> = outcomes
                .iter()
                .filter(|(_, outcome)| matches!(outcome, CheckOutcome::Changed))
                .map(|(id, _)| *id)
                .collect();
            dead.extend(outcomes.iter().filter(|(_, outcome)| matches!(outcome, CheckOutcome::Dead)).map(|(id, _)| *id));

            let store = app.store.clone();
            let curseforge = app.curseforge.clone();
            let cfg = app.cf_sync_config();
            let resync_outcomes = app
                .curseforge_pool
                .run_all(changed, move |id| {
                    let store = store.clone();
                    let curseforge = curseforge.clone();
                    let cfg = cfg;
                    async move {
                        match sync_curseforge_project(store, &curseforge, id, &cfg).await {
                            Ok(detail) => CurseForgeRefreshOutcome::Synced(ProjectSummaryLine {
                                name: detail.name,
                                id: detail.id.to_string(),
                                version_count: detail.version_count,
                            }),
                            Err(err) => {
                                warn!(project_id = id, error = %err, "curseforge resync failed");
                                CurseForgeRefreshOutcome::Failed
                            }
                        }
                    }
                })
                .await;
            for outcome in resync_outcomes {
                match outcome {
                    CurseForgeRefreshOutcome::Synced(line) => synced.push(line),
                    CurseForgeRefreshOutcome::Failed => failed += 1,
                }
            }
        }
    }

    for id in dead {
        delete_dead_curseforge_project(&app, id).await;
    }

    let summary = JobSummary::Refresh {
        platform: Platform::CurseForge,
        synced,
        failed_count: failed,
    };
    notify(&app, &summary).await;
}

enum ModrinthRefreshOutcome {
    Synced(ProjectSummaryLine),
    Failed,
}

async fn delete_dead_modrinth_project(app: &App, id: &str) {
    if let Err(err) = app
        .store
        .delete_many(EntityType::Project(Platform::Modrinth), doc! { "id": id })
        .await
    {
        warn!(project_id = %id, error = %err, "failed to prune dead modrinth project");
    }
    if let Err(err) = app
        .store
        .delete_many(EntityType::VersionOrFile(Platform::Modrinth), doc! { "projectId": id })
        .await
    {
        warn!(project_id = %id, error = %err, "failed to prune dead modrinth project's versions");
    }
}

async fn run_modrinth_refresh(app: Arc<App>, full: bool) {
    let projects = all_projects(&app.store, EntityType::Project(Platform::Modrinth)).await;
    let mut synced = Vec::new();
    let mut failed = 0usize;
    let mut dead: Vec<String> = Vec::new();

    if full {
        let ids: Vec<String> = projects
            .iter()
            .filter_map(|p| match &p.id {
                ProjectId::Modrinth(id) => Some(id.clone()),
                _ => None,
            })
            .collect();
        let store = app.store.clone();
        let modrinth = app.modrinth.clone();
        let cfg = app.mr_sync_config();
        let outcomes = app
            .modrinth_pool
            .run_all(ids, move |id| {
                let store = store.clone();
                let modrinth = modrinth.clone();
                let cfg = cfg;
                async move {
                    match sync_modrinth_project(store, &modrinth, &id, &cfg).await {
                        Ok(detail) => ModrinthRefreshOutcome::Synced(ProjectSummaryLine {
                            name: detail.name,
                            id: detail.id.to_string(),
                            version_count: detail.version_count,
                        }),
                        Err(err) => {
                            warn!(project_id = %id, error = %err, "modrinth full refresh failed");
                            ModrinthRefreshOutcome::Failed
                        }
                    }
                }
            })
            .await;
        for outcome in outcomes {
            match outcome {
                ModrinthRefreshOutcome::Synced(line) => synced.push(line),
                ModrinthRefreshOutcome::Failed => failed += 1,
            }
        }
    } else {
        for chunk in projects.chunks(app.config.modrinth_chunk_size.max(1)) {
            let outcomes = match check_modrinth_page(&app.store, &app.modrinth, chunk).await {
                Ok(outcomes) => outcomes,
                Err(err) => {
                    error!(error = %err, "modrinth checker sweep failed for a page");
                    continue;
                }
            };
            let changed: Vec<String> = outcomes
                .iter()
                .filter(|(_, outcome)| matches!(outcome, CheckOutcome::Changed))
                .map(|(id, _)| id.clone())
                .collect();
            dead.extend(
                outcomes
                    .iter()
                    .filter(|(_, outcome)| matches!(outcome, CheckOutcome::Dead))
                    .map(|(id, _)| id.clone()),
            );

            let store = app.store.clone();
            let modrinth = app.modrinth.clone();
            let cfg = app.mr_sync_config();
            let resync_outcomes = app
                .modrinth_pool
                .run_all(changed, move |id| {
                    let store = store.clone();
                    let modrinth = modrinth.clone();
                    let cfg = cfg;
                    async move {
                        match sync_modrinth_project(store, &modrinth, &id, &cfg).await {
                            Ok(detail) => ModrinthRefreshOutcome::Synced(ProjectSummaryLine {
                                name: detail.name,
                                id: detail.id.to_string(),
                                version_count: detail.version_count,
                            }),
                            Err(err) => {
                                warn!(project_id = %id, error = %err, "modrinth resync failed");
                                ModrinthRefreshOutcome::Failed
                            }
                        }
                    }
                })
                .await;
            for outcome in resync_outcomes {
                match outcome {
                    ModrinthRefreshOutcome::Synced(line) => synced.push(line),
                    ModrinthRefreshOutcome::Failed => failed += 1,
                }
            }
        }
    }

    for id in &dead {
        delete_dead_modrinth_project(&app, id).await;
    }

    let summary = JobSummary::Refresh {
        platform: Platform::Modrinth,
        synced,
        failed_count: failed,
    };
    notify(&app, &summary).await;
}

fn summary_lines(details: Vec<model::ProjectDetail>) -> Vec<ProjectSummaryLine> {
    details
        .into_iter()
        .map(|detail| ProjectSummaryLine {
            name: detail.name,
            id: detail.id.to_string(),
            version_count: detail.version_count,
        })
        .collect()
}

async fn run_curseforge_drain(app: Arc<App>) {
    let result = drain_curseforge_queues(
        app.store.clone(),
        app.sets.as_ref(),
        app.curseforge.clone(),
        &app.curseforge_pool,
        app.cf_sync_config(),
    )
    .await;
    match result {
        Ok((total, synced)) if total > 0 => {
            notify(
                &app,
                &JobSummary::QueueSync {
                    platform: Platform::CurseForge,
                    total_captured: total,
                    newly_discovered: summary_lines(synced),
                },
            )
            .await;
        }
        Ok(_) => {}
        Err(err) => error!(error = %err, "curseforge queue drain failed"),
    }
}

async fn run_modrinth_drain(app: Arc<App>) {
    let result = drain_modrinth_queues(
        app.store.clone(),
        app.sets.as_ref(),
        app.modrinth.clone(),
        &app.modrinth_pool,
        app.mr_sync_config(),
    )
    .await;
    match result {
        Ok((total, synced)) if total > 0 => {
            notify(
                &app,
                &JobSummary::QueueSync {
                    platform: Platform::Modrinth,
                    total_captured: total,
                    newly_discovered: summary_lines(synced),
                },
            )
            .await;
        }
        Ok(_) => {}
        Err(err) => error!(error = %err, "modrinth queue drain failed"),
    }
}

async fn run_curseforge_search(app: Arc<App>) {
    match discover_curseforge(app.store.clone(), app.curseforge.clone(), &app.curseforge_pool, app.cf_search_config(), app.cf_sync_config()).await {
        Ok((ids, synced)) if !ids.is_empty() => {
            notify(
                &app,
                &JobSummary::SearchSync {
                    platform: Platform::CurseForge,
                    total_discovered: ids.len(),
                    newly_discovered: summary_lines(synced),
                },
            )
            .await;
        }
        Ok(_) => {}
        Err(err) => error!(error = %err, "curseforge search discovery failed"),
    }
}

async fn run_modrinth_search(app: Arc<App>) {
    match discover_modrinth(app.store.clone(), app.modrinth.clone(), &app.modrinth_pool, app.mr_search_config(), app.mr_sync_config()).await {
        Ok((ids, synced)) if !ids.is_empty() => {
            notify(
                &app,
                &JobSummary::SearchSync {
                    platform: Platform::Modrinth,
                    total_discovered: ids.len(),
                    newly_discovered: summary_lines(synced),
                },
            )
            .await;
        }
        Ok(_) => {}
        Err(err) => error!(error = %err, "modrinth search discovery failed"),
    }
}

async fn run_curseforge_categories(app: Arc<App>) {
    let categories = match app.curseforge.get_categories(432, None, None).await {
        Ok(categories) => categories,
        Err(err) => {
            error!(error = %err, "failed to fetch curseforge categories");
            return;
        }
    };
    let total = categories.len();
    let record = model::EnumerationRecord {
        platform: Platform::CurseForge,
        kind: model::EnumerationKind::Category,
        raw: serde_json::Value::Array(categories),
        refreshed_at: chrono::Utc::now(),
    };
    if let Err(err) = app
        .store
        .delete_many(EntityType::Enumeration(Platform::CurseForge), doc! {})
        .await
    {
        warn!(error = %err, "failed to clear curseforge category enumeration before replace");
    }
    if let Err(err) = app
        .store
        .upsert_many(EntityType::Enumeration(Platform::CurseForge), vec![Entity::Enumeration(record)])
        .await
    {
        error!(error = %err, "failed to persist curseforge category enumeration");
        return;
    }
    notify(&app, &JobSummary::Categories { total }).await;
}

async fn run_modrinth_tags(app: Arc<App>) {
    let (categories, loaders, game_versions) = tokio::join!(
        app.modrinth.get_categories(),
        app.modrinth.get_loaders(),
        app.modrinth.get_game_versions(),
    );

    let mut counts = (0usize, 0usize, 0usize);
    let mut records = Vec::new();

    match categories {
        Ok(items) => {
            counts.0 = items.len();
            records.push(Entity::Enumeration(model::EnumerationRecord {
                platform: Platform::Modrinth,
                kind: model::EnumerationKind::Category,
                raw: serde_json::Value::Array(items),
                refreshed_at: chrono::Utc::now(),
            }));
        }
        Err(err) => error!(error = %err, "failed to fetch modrinth categories"),
    }
    match loaders {
        Ok(items) => {
            counts.1 = items.len();
            records.push(Entity::Enumeration(model::EnumerationRecord {
                platform: Platform::Modrinth,
                kind: model::EnumerationKind::Loader,
                raw: serde_json::Value::Array(items),
                refreshed_at: chrono::Utc::now(),
            }));
        }
        Err(err) => error!(error = %err, "failed to fetch modrinth loaders"),
    }
    match game_versions {
        Ok(items) => {
            counts.2 = items.len();
            records.push(Entity::Enumeration(model::EnumerationRecord {
                platform: Platform::Modrinth,
                kind: model::EnumerationKind::GameVersion,
                raw: serde_json::Value::Array(items),
                refreshed_at: chrono::Utc::now(),
            }));
        }
        Err(err) => error!(error = %err, "failed to fetch modrinth game versions"),
    }

    if records.is_empty() {
        return;
    }
    if let Err(err) = app
        .store
        .delete_many(EntityType::Enumeration(Platform::Modrinth), doc! {})
        .await
    {
        warn!(error = %err, "failed to clear modrinth tag enumeration before replace");
    }
    if let Err(err) = app.store.upsert_many(EntityType::Enumeration(Platform::Modrinth), records).await {
        error!(error = %err, "failed to persist modrinth tag enumeration");
        return;
    }

    notify(
        &app,
        &JobSummary::Tags {
            categories: counts.0,
            loaders: counts.1,
            game_versions: counts.2,
        },
    )
    .await;
}

async fn run_stats(app: Arc<App>) {
    let cf_count = app.store.count(EntityType::Project(Platform::CurseForge), doc! {}).await;
    let mr_count = app.store.count(EntityType::Project(Platform::Modrinth), doc! {}).await;
    info!(
        curseforge = ?cf_count,
        modrinth = ?mr_count,
        "periodic statistics"
    );
}

async fn notify(app: &App, summary: &JobSummary) {
    if let Err(err) = app.notifier.notify(summary).await {
        warn!(error = %err, "notifier failed to deliver job summary");
    }
}

/// Registers the standard job inventory and starts the scheduler. Jobs
/// marked `run_immediately` also fire once at startup, matching the
/// reference scheduler's `next_run_time=now()` jobs.
pub fn schedule(app: App) -> Vec<JobHandle> {
    let app = Arc::new(app);
    let mut scheduler = Scheduler::new();
    let mut run_immediately = Vec::new();

    macro_rules! register {
        ($name:expr, $run_immediately:expr, $body:expr) => {{
            if $run_immediately {
                run_immediately.push($name);
            }
            let trigger = trigger_for(&app, $name);
            let enabled = app.config.job_enabled($name);
            let app = app.clone();
            scheduler.register($name, trigger, enabled, move || {
                let app = app.clone();
                $body(app)
            });
        }};
    }

    register!("cf.refresh", true, |app| run_curseforge_refresh(app, false));
    register!("mr.refresh", true, |app| run_modrinth_refresh(app, false));
    register!("cf.refreshFull", false, |app| run_curseforge_refresh(app, true));
    register!("mr.refreshFull", false, |app| run_modrinth_refresh(app, true));
    register!("cf.drainQueue", true, run_curseforge_drain);
    register!("mr.drainQueue", true, run_modrinth_drain);
    register!("cf.searchNew", true, run_curseforge_search);
    register!("mr.searchNew", true, run_modrinth_search);
    register!("cf.categories", true, run_curseforge_categories);
    register!("mr.tags", true, run_modrinth_tags);
    register!("stats", false, run_stats);

    let shutdown = app.shutdown.clone();
    scheduler.start(&run_immediately, shutdown)
}
