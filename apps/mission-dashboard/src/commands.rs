use anyhow::{anyhow, Context, Result};
use serde_json::json;

use mission_dashboard::auth::{AuthStore, RegisterOutcome, Registration};
use mission_dashboard::cli::{LocateArgs, LoginArgs, MapArgs, RegisterArgs, VerifyEmailArgs};
use mission_dashboard::config::DashboardConfig;
use mission_dashboard::dashboard::Dashboard;
use mission_dashboard::error::AuthError;
use mission_dashboard::geo::LngLat;
use mission_dashboard::map::geolocation::{StaticGeolocator, TracingAlerter};
use mission_dashboard::map::headless::HeadlessMap;
use mission_dashboard::map::sync::MapDefaults;
use mission_dashboard::map::POINT_LAYER_ID;
use mission_dashboard::missions::MissionStore;

fn mission_store(config: &DashboardConfig) -> Result<MissionStore> {
    let http = reqwest::Client::builder()
        .build()
        .context("failed to build mission http client")?;
    Ok(MissionStore::new(config, http))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_fix(raw: &str) -> Result<LngLat> {
    LngLat::parse(raw).ok_or_else(|| anyhow!("expected `lng,lat`, got `{raw}`"))
}

pub async fn missions(config: &DashboardConfig, json: bool) -> Result<()> {
    let store = mission_store(config)?;
    let features = store.fetch_missions().await?;
    let state = store.snapshot();
    if json {
        return print_json(&json!({
            "features": features,
            "bounds": state.bounds,
            "isDataLoaded": state.is_data_loaded,
        }));
    }
    match state.bounds {
        Some(bounds) => println!(
            "{features} missions, bounds [{}, {}] to [{}, {}]",
            bounds.south_west().lng(),
            bounds.south_west().lat(),
            bounds.north_east().lng(),
            bounds.north_east().lat()
        ),
        None => println!("{features} missions, no bounds"),
    }
    Ok(())
}

/// Always prints JSON: the widget snapshot is the output.
pub async fn map(config: &DashboardConfig, args: MapArgs) -> Result<()> {
    let store = mission_store(config)?;
    let mut dashboard = Dashboard::new(&store, MapDefaults::from_config(config));
    if let Err(err) = dashboard.mount(HeadlessMap::new).await {
        tracing::warn!(error = %err, "continuing with an empty map");
    }

    let load = dashboard
        .map_mut()
        .widget_mut()
        .map(HeadlessMap::complete_style_load);
    if let Some(load) = load {
        dashboard.handle_event(load);
    }

    if let Some(raw) = args.click.as_deref() {
        let at = parse_fix(raw)?;
        let click = dashboard
            .map()
            .widget()
            .and_then(|widget| widget.simulate_click(POINT_LAYER_ID, at));
        match click {
            Some(event) => dashboard.handle_event(event),
            None => tracing::info!(lng = at.lng(), lat = at.lat(), "no mission point at click"),
        }
    }
    if args.home {
        dashboard.home();
    }

    let snapshot = dashboard
        .map()
        .widget()
        .map(HeadlessMap::snapshot)
        .ok_or_else(|| anyhow!("map widget was not mounted"))?;
    print_json(&json!({
        "map": snapshot,
        "store": store.snapshot(),
    }))
}

pub async fn register(config: &DashboardConfig, args: RegisterArgs, json: bool) -> Result<()> {
    let auth = AuthStore::new(config)?;
    let registration = Registration {
        email: args.email,
        password: args.password,
        first_name: args.first_name,
        last_name: args.last_name,
    };
    match auth.register(&registration).await {
        Ok(RegisterOutcome::Registered) => {
            if json {
                return print_json(&json!({"status": "registered"}));
            }
            println!("Registered {}.", registration.email);
            Ok(())
        }
        Ok(RegisterOutcome::VerificationPending { message }) => {
            if json {
                return print_json(&json!({"status": "verification-pending", "message": message}));
            }
            println!("{message}");
            Ok(())
        }
        Err(err @ AuthError::Validation(_)) => {
            if json {
                print_json(&json!({"status": "rejected", "errors": err.field_errors()}))?;
            } else {
                for field in err.field_errors() {
                    match field.param {
                        Some(param) => eprintln!("{param}: {}", field.message),
                        None => eprintln!("{}", field.message),
                    }
                }
            }
            Err(anyhow!("registration failed"))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn login(config: &DashboardConfig, args: LoginArgs, json: bool) -> Result<()> {
    let auth = AuthStore::new(config)?;
    let user = auth.login(&args.email, &args.password).await?;
    if json {
        return print_json(&json!({"isAuthenticated": auth.is_authenticated(), "user": user}));
    }
    let name = user
        .as_ref()
        .and_then(|user| user.display.clone().or_else(|| user.email.clone()))
        .unwrap_or_else(|| args.email.clone());
    println!("Logged in as {name}.");
    Ok(())
}

pub async fn logout(config: &DashboardConfig, json: bool) -> Result<()> {
    let auth = AuthStore::new(config)?;
    let outcome = auth.logout().await;
    if json {
        return print_json(&json!({
            "confirmed": outcome.is_confirmed(),
            "message": outcome.message(),
        }));
    }
    println!("{}", outcome.message());
    Ok(())
}

pub async fn verify_email(config: &DashboardConfig, args: VerifyEmailArgs) -> Result<()> {
    let auth = AuthStore::new(config)?;
    auth.verify_email(&args.key).await?;
    println!("Email verified. You can now log in.");
    Ok(())
}

pub async fn whoami(config: &DashboardConfig, json: bool) -> Result<()> {
    let auth = AuthStore::new(config)?;
    let confirmed = auth.fetch_user().await;
    let state = auth.snapshot();
    if json {
        return print_json(&json!({"isAuthenticated": confirmed, "user": state.user}));
    }
    match state.user {
        Some(user) if confirmed => println!(
            "{}",
            user.display
                .or(user.email)
                .or(user.username)
                .unwrap_or_else(|| "signed in".to_string())
        ),
        _ => println!("Not signed in."),
    }
    Ok(())
}

pub async fn locate(config: &DashboardConfig, args: LocateArgs, json: bool) -> Result<()> {
    let fix = match args.fix.as_deref() {
        Some(raw) => Some(parse_fix(raw)?),
        None => config.gps_fix,
    };
    let geolocator = StaticGeolocator::from_fix(fix);

    let store = mission_store(config)?;
    let mut dashboard: Dashboard<'_, HeadlessMap> =
        Dashboard::new(&store, MapDefaults::from_config(config));
    dashboard.map_mut().mount(&store.snapshot(), HeadlessMap::new);
    let load = dashboard
        .map_mut()
        .widget_mut()
        .map(HeadlessMap::complete_style_load);
    if let Some(load) = load {
        dashboard.handle_event(load);
    }
    dashboard.locate(&geolocator, &TracingAlerter).await;

    let state = store.snapshot();
    let Some(location) = state.user_location else {
        return Err(anyhow!("no position fix"));
    };
    if json {
        let widget = dashboard.map().widget().map(HeadlessMap::snapshot);
        return print_json(&json!({"userLocation": location, "map": widget}));
    }
    println!("Located at {}, {}.", location.lng(), location.lat());
    Ok(())
}
