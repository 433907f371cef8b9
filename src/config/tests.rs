use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        logging: LoggingOverrides {
            log_level: Some("debug".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_describe_a_local_deployment() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.public_addr.to_string(), "127.0.0.1:3000");
    assert_eq!(settings.air_quality.ttl, Duration::from_secs(45 * 60));
    assert_eq!(settings.air_quality.timeout, Duration::from_secs(5));
    assert_eq!(settings.air_quality.local_index_code, "usa_epa");
    assert_eq!(settings.air_quality.latitude, DEFAULT_AQI_LATITUDE);
    assert_eq!(settings.air_quality.longitude, DEFAULT_AQI_LONGITUDE);
    assert!(settings.air_quality.api_key.is_none());
    assert_eq!(settings.optimize.min_bytes, 200 * 1024);
    assert_eq!(settings.optimize.max_dimension, 1920);
    assert!(matches!(
        settings.storage,
        StorageSettings::Filesystem { ref directory } if directory == std::path::Path::new("uploads")
    ));
}

#[test]
fn coordinates_default_to_the_venue_and_accept_overrides() {
    assert_ne!((DEFAULT_AQI_LATITUDE, DEFAULT_AQI_LONGITUDE), (0.0, 0.0));

    let mut raw = RawSettings::default();
    raw.air_quality.latitude = Some(41.8781);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.air_quality.latitude, 41.8781);
    assert_eq!(settings.air_quality.longitude, DEFAULT_AQI_LONGITUDE);
}

#[test]
fn blank_secrets_are_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.air_quality.api_key = Some("   ".to_string());
    raw.database.url = Some(String::new());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.air_quality.api_key.is_none());
    assert!(settings.database.url.is_none());
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.air_quality.ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "air_quality.ttl_seconds",
            ..
        }
    ));
}

#[test]
fn out_of_range_coordinates_are_rejected() {
    let mut raw = RawSettings::default();
    raw.air_quality.latitude = Some(123.0);

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "air_quality.latitude",
            ..
        })
    ));
}

#[test]
fn http_storage_requires_url() {
    let mut raw = RawSettings::default();
    raw.storage.backend = Some("http".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "storage.url",
            ..
        })
    ));
}

#[test]
fn storage_base_url_gains_trailing_slash() {
    let mut raw = RawSettings::default();
    raw.storage.backend = Some("http".to_string());
    raw.storage.url = Some("https://project.supabase.co/storage/v1".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    match settings.storage {
        StorageSettings::Http {
            base_url, bucket, ..
        } => {
            assert_eq!(base_url.as_str(), "https://project.supabase.co/storage/v1/");
            assert_eq!(bucket, "site-images");
        }
        other => panic!("unexpected storage settings: {other:?}"),
    }
}

#[test]
fn invalid_jpeg_quality_is_rejected() {
    let mut raw = RawSettings::default();
    raw.optimize.jpeg_quality = Some(0);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["teebox"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "teebox",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--log-json",
        "true",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(serve.overrides.logging.log_json, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_optimize_images_arguments() {
    let args = CliArgs::parse_from([
        "teebox",
        "optimize-images",
        "--apply",
        "--prefix",
        "clubs/",
        "--min-bytes",
        "1024",
        "--storage-directory",
        "/srv/images",
    ]);

    let Some(Command::OptimizeImages(optimize)) = args.command.clone() else {
        panic!("wrong command parsed");
    };
    assert!(optimize.apply);
    assert_eq!(optimize.prefix.as_deref(), Some("clubs/"));
    assert_eq!(optimize.min_bytes, Some(1024));

    let mut raw = RawSettings::default();
    raw.apply_command_overrides(args.command.as_ref());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.optimize.min_bytes, 1024);
    assert!(matches!(
        settings.storage,
        StorageSettings::Filesystem { ref directory } if directory == std::path::Path::new("/srv/images")
    ));
}

#[test]
fn optimize_images_defaults_to_dry_run() {
    let args = CliArgs::parse_from(["teebox", "optimize-images"]);
    match args.command.expect("optimize command") {
        Command::OptimizeImages(optimize) => assert!(!optimize.apply),
        _ => panic!("wrong command parsed"),
    }
}
