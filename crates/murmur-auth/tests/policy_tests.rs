//! Integration tests for the admission policy against real files.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use murmur_auth::{
    AuthConfig, Authenticator, Credential, Decision, MechanismConfig, MechanismKind, RejectReason,
};
use murmur_cert::Certificate;
use murmur_crypto::password::{hash_password_with, PasswordHashParams};
use murmur_types::MurmurError;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Returns a unique temporary directory for each test.
fn temp_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "murmur-auth-test-{}-{}-{}",
        std::process::id(),
        id,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    ));
    let _ = std::fs::create_dir_all(&dir);
    dir
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("murmur_auth=debug")
        .with_test_writer()
        .try_init();
}

/// Hashes with cheap Argon2 costs to keep tests fast.
fn hashed(password: &str) -> Result<String, MurmurError> {
    let params = PasswordHashParams {
        m_cost: 256,
        t_cost: 1,
        p_cost: 1,
    };
    hash_password_with(password, &params)
}

fn plain(user: &str, password: &str) -> Credential {
    Credential::Plain {
        username: user.into(),
        password: password.into(),
    }
}

fn curve(cert: &Certificate) -> Credential {
    Credential::Curve {
        public_key: *cert.public_key(),
    }
}

// ---------------------------------------------------------------------------
// PLAIN
// ---------------------------------------------------------------------------

#[test]
fn plain_checks_password_file() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let path = temp_dir().join("passwords");
    std::fs::write(&path, format!("admin:{}\n", hashed("secret")?))?;

    let auth = Authenticator::new();
    auth.set_verbose(true);
    auth.enable_plain(&path)?;
    assert_eq!(auth.mechanism()?, MechanismKind::Plain);

    assert_eq!(auth.decide("127.0.0.1", &plain("admin", "secret"))?, Decision::Admit);
    assert_eq!(
        auth.decide("127.0.0.1", &plain("admin", "wrong"))?,
        Decision::Reject(RejectReason::WrongPassword)
    );
    assert_eq!(
        auth.decide("127.0.0.1", &plain("nobody", "secret"))?,
        Decision::Reject(RejectReason::UnknownUser)
    );
    assert_eq!(
        auth.decide("127.0.0.1", &Credential::Null)?,
        Decision::Reject(RejectReason::WrongMechanism)
    );
    Ok(())
}

#[test]
fn plain_reloads_changed_file() -> Result<(), Box<dyn std::error::Error>> {
    let path = temp_dir().join("passwords");
    std::fs::write(&path, format!("admin:{}\n", hashed("secret")?))?;

    let auth = Authenticator::new();
    auth.enable_plain(&path)?;
    assert!(!auth.decide("h", &plain("guest", "guest"))?.is_admitted());

    std::fs::write(
        &path,
        format!(
            "# rotated\nadmin:{}\nguest:{}\n",
            hashed("rotated")?,
            hashed("guest")?
        ),
    )?;

    assert!(auth.decide("h", &plain("guest", "guest"))?.is_admitted());
    assert!(auth.decide("h", &plain("admin", "rotated"))?.is_admitted());
    assert!(!auth.decide("h", &plain("admin", "secret"))?.is_admitted());
    Ok(())
}

#[test]
fn plain_with_corrupted_file_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let path = temp_dir().join("passwords");
    std::fs::write(&path, format!("admin:{}\n", hashed("secret")?))?;

    let auth = Authenticator::new();
    auth.enable_plain(&path)?;
    std::fs::write(&path, "admin has no separator at all\n")?;

    let result = auth.decide("h", &plain("admin", "secret"));
    assert!(matches!(result, Err(MurmurError::MalformedPasswordFile { .. })));
    Ok(())
}

// ---------------------------------------------------------------------------
// CURVE
// ---------------------------------------------------------------------------

#[test]
fn curve_directory_picks_up_new_certificates() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let dir = temp_dir().join("certs");
    let known = Certificate::new();
    std::fs::create_dir_all(&dir)?;
    known.save_public(&dir.join("known.cert"))?;

    let auth = Authenticator::new();
    auth.enable_curve(dir.to_str().ok_or("non-utf8 path")?)?;
    assert_eq!(auth.mechanism()?, MechanismKind::Curve);
    assert!(auth.decide("h", &curve(&known))?.is_admitted());

    let newcomer = Certificate::new();
    assert_eq!(
        auth.decide("h", &curve(&newcomer))?,
        Decision::Reject(RejectReason::UnknownKey)
    );

    newcomer.save(&dir.join("newcomer.cert"))?;
    assert!(auth.decide("h", &curve(&newcomer))?.is_admitted());
    Ok(())
}

#[test]
fn curve_store_vanishing_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = temp_dir().join("certs");
    let auth = Authenticator::new();
    auth.enable_curve(dir.to_str().ok_or("non-utf8 path")?)?;
    std::fs::remove_dir_all(&dir)?;

    let result = auth.decide("h", &curve(&Certificate::new()));
    assert!(matches!(result, Err(MurmurError::StoreUnavailable { .. })));
    Ok(())
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn from_config_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = temp_dir();
    let passwords = dir.join("passwords");
    std::fs::write(&passwords, format!("ops:{}\n", hashed("pw")?))?;

    let config = AuthConfig {
        allow: vec!["10.1.1.1".into()],
        mechanism: MechanismConfig::Plain {
            password_file: passwords,
        },
        verbose: true,
        ..AuthConfig::default()
    };
    let config_path = dir.join("auth.json");
    std::fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    let loaded = AuthConfig::load_from_file(&config_path)?;
    assert_eq!(loaded, config);

    let auth = Authenticator::from_config(&loaded)?;
    assert!(auth.is_verbose());
    assert!(auth.decide("10.1.1.1", &plain("ops", "pw"))?.is_admitted());
    assert_eq!(
        auth.decide("10.1.1.2", &plain("ops", "pw"))?,
        Decision::Reject(RejectReason::NotAllowed)
    );
    Ok(())
}

#[test]
fn unparseable_config_file_is_config_error() -> Result<(), Box<dyn std::error::Error>> {
    let path = temp_dir().join("auth.json");
    std::fs::write(&path, "{ not json")?;
    assert!(matches!(
        AuthConfig::load_from_file(&path),
        Err(MurmurError::ConfigError { .. })
    ));
    Ok(())
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn allow_list_grows_while_deciding() -> Result<(), Box<dyn std::error::Error>> {
    let auth = Arc::new(Authenticator::new());
    auth.allow(["seed"])?;

    let writer = {
        let auth = Arc::clone(&auth);
        std::thread::spawn(move || {
            for i in 0..200 {
                let _ = auth.allow([format!("10.0.0.{i}")]);
            }
        })
    };

    for _ in 0..200 {
        // Unknown addresses stay rejected whatever the writer has added.
        let decision = auth.decide("192.168.0.1", &Credential::Null)?;
        assert_eq!(decision, Decision::Reject(RejectReason::NotAllowed));
        assert!(auth.decide("seed", &Credential::Null)?.is_admitted());
    }
    writer.join().map_err(|_| "writer panicked")?;
    assert!(auth.decide("10.0.0.199", &Credential::Null)?.is_admitted());
    Ok(())
}
