//! citadel-mail CLI — sign, encrypt and submit mail
//!
//! Usage:
//!   citadel-mail send --config <file> --from <addr> --to <addr> --subject <s> [--body <file>] [--attach <file>]... [--dry-run]
//!   citadel-mail open --keystore <file> --alias <alias> --input <file> [--verify <cert>]
//!   citadel-mail import-key --keystore <file> --alias <alias> --key <pkcs8> --cert <cert>
//!   citadel-mail inspect <file>

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lettre::message::header::{ContentDisposition, ContentType};
use lettre::message::{MultiPart, SinglePart};
use tracing_subscriber::EnvFilter;

use citadel_mail::wire::{self, SUITE_AEAD_AES256GCM, SUITE_KEM_X25519};
use citadel_mail::{
    extract_envelope, open_raw, Certificate, Content, EncryptedEnvelope, InMemoryTransport,
    KeyStoreFile, MailConfig, SecureMailPipeline,
};

#[derive(Parser, Debug)]
#[command(name = "citadel-mail")]
#[command(version, about = "Sign-then-encrypt mail submission", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose, sign, encrypt and submit a message
    Send {
        /// JSON configuration file (environment overrides apply on top)
        #[arg(short, long, env = "CITADEL_MAIL_CONFIG")]
        config: Option<PathBuf>,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "")]
        subject: String,
        /// Text body file; stdin when omitted
        #[arg(long)]
        body: Option<PathBuf>,
        /// Attach a file (sends multipart/mixed)
        #[arg(long)]
        attach: Vec<PathBuf>,
        /// Stop after finalization and write the message instead of submitting it
        #[arg(long)]
        dry_run: bool,
        /// Output file for --dry-run (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decrypt a received message and optionally verify its signature
    Open {
        #[arg(long, env = "CITADEL_MAIL_KEYSTORE")]
        keystore: PathBuf,
        #[arg(long, env = "CITADEL_MAIL_KEY_ALIAS")]
        alias: String,
        #[arg(long, env = "CITADEL_MAIL_KEY_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
        /// Rendered message; stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Sender certificate to verify against
        #[arg(long)]
        verify: Option<PathBuf>,
    },
    /// Add a PKCS#8 Ed25519 key and its certificate to a key container
    ImportKey {
        #[arg(long, env = "CITADEL_MAIL_KEYSTORE")]
        keystore: PathBuf,
        #[arg(long)]
        alias: String,
        #[arg(long)]
        key: PathBuf,
        #[arg(long)]
        cert: PathBuf,
        #[arg(long, env = "CITADEL_MAIL_KEY_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },
    /// Show envelope metadata (no decryption)
    Inspect { file: PathBuf },
}

fn main() -> ExitCode {
    init_logging();

    let result = match Cli::parse().command {
        Command::Send {
            config,
            from,
            to,
            subject,
            body,
            attach,
            dry_run,
            output,
        } => cmd_send(config.as_deref(), &from, &to, &subject, body.as_deref(), &attach, dry_run, output.as_deref()),
        Command::Open {
            keystore,
            alias,
            passphrase,
            input,
            verify,
        } => cmd_open(&keystore, &alias, &passphrase, input.as_deref(), verify.as_deref()),
        Command::ImportKey {
            keystore,
            alias,
            key,
            cert,
            passphrase,
        } => cmd_import_key(&keystore, &alias, &key, &cert, &passphrase),
        Command::Inspect { file } => cmd_inspect(&file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "citadel_mail=info".into());
    let json = std::env::var("CITADEL_MAIL_LOG_JSON").map(|v| v == "1" || v == "true").unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
    }
}

fn read_input(path: Option<&Path>) -> io::Result<Vec<u8>> {
    match path {
        Some(path) => fs::read(path),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_send(
    config: Option<&Path>,
    from: &str,
    to: &str,
    subject: &str,
    body: Option<&Path>,
    attach: &[PathBuf],
    dry_run: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match config {
        Some(path) => MailConfig::from_file(path)?,
        None => MailConfig::default(),
    };
    config.apply_env()?;

    let text = String::from_utf8(read_input(body)?)?;
    let content = if attach.is_empty() {
        Content::Text(text)
    } else {
        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(text));
        for path in attach {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or("attachment path has no file name")?;
            let octets = ContentType::parse("application/octet-stream").map_err(|e| e.to_string())?;
            multipart = multipart.singlepart(
                SinglePart::builder()
                    .header(octets)
                    .header(ContentDisposition::attachment(name))
                    .body(fs::read(path)?),
            );
        }
        Content::Multipart(multipart)
    };

    if dry_run {
        let pipeline: SecureMailPipeline = config.build_pipeline_with(Arc::new(InMemoryTransport::new()))?;
        let sealed = pipeline.seal(from, to, subject, content)?;
        let rendered = sealed.message.to_bytes();
        match output {
            Some(path) => fs::write(path, &rendered)?,
            None => io::stdout().write_all(&rendered)?,
        }
        eprintln!(
            "Sealed {} ({}), {} bytes",
            sealed.message.message_id(),
            if sealed.signing_skipped { "unsigned" } else { "signed" },
            rendered.len()
        );
        return Ok(());
    }

    let report = config.build_pipeline()?.send(from, to, subject, content)?;
    eprintln!("Submitted {}: {}", report.message_id, report.ack.detail);
    if report.signing_skipped {
        eprintln!("warning: message was not signed");
    }
    Ok(())
}

fn cmd_open(
    keystore: &Path,
    alias: &str,
    passphrase: &str,
    input: Option<&Path>,
    verify: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = KeyStoreFile::read(keystore)?.unlock(alias, passphrase)?;
    let raw = read_input(input)?;
    let opened = open_raw(&raw, &key)?;

    if let Some(cert_path) = verify {
        let sender = Certificate::decode(&fs::read(cert_path)?)?;
        opened.verify(&sender)?;
        eprintln!("Signature OK ({})", sender.subject());
    } else if let Some(signed) = opened.signed() {
        let signer = signed.signer_certificate()?;
        eprintln!("Signed by {} (not verified)", signer.subject());
    } else {
        eprintln!("warning: message is not signed");
    }

    io::stdout().write_all(opened.message_bytes())?;
    Ok(())
}

fn cmd_import_key(
    keystore: &Path,
    alias: &str,
    key_path: &Path,
    cert_path: &Path,
    passphrase: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = if keystore.exists() {
        KeyStoreFile::read(keystore)?
    } else {
        KeyStoreFile::default()
    };

    let key_bytes = fs::read(key_path)?;
    let pkcs8 = if key_bytes.starts_with(b"-----BEGIN") {
        pem::parse(&key_bytes)?.into_contents()
    } else {
        key_bytes
    };
    let certificate = Certificate::decode(&fs::read(cert_path)?)?;

    store.insert(alias, &pkcs8, certificate.der(), passphrase)?;
    store.save(keystore)?;
    eprintln!("Imported {} ({})", alias, certificate.fingerprint_hex());
    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(path)?;
    let envelope = match EncryptedEnvelope::from_bytes(data.clone()) {
        Ok(envelope) => envelope,
        Err(_) => extract_envelope(&data).map_err(|_| "not a citadel-mail message or envelope")?,
    };
    let parts = wire::decode_envelope(envelope.as_bytes()).map_err(|_| "invalid envelope format")?;

    let kem_suite = if parts.suite_kem == SUITE_KEM_X25519 { "X25519" } else { "unknown" };
    let aead_suite = if parts.suite_aead == SUITE_AEAD_AES256GCM { "AES-256-GCM" } else { "unknown" };

    println!("Citadel Mail Envelope");
    println!("=====================");
    println!("Version:         {}", parts.version);
    println!("KEM Suite:       0x{:02X} ({})", parts.suite_kem, kem_suite);
    println!("AEAD Suite:      0x{:02X} ({})", parts.suite_aead, aead_suite);
    println!("Flags:           0x{:02X}", parts.flags);
    println!("Signed payload:  {}", envelope.is_signed_payload());
    println!("Recipient:       {}", hex::encode(parts.recipient_fingerprint));
    println!();
    println!("Total Size:      {} bytes", envelope.len());
    println!("Overhead:        {} bytes", wire::MIN_ENVELOPE_BYTES);
    println!("Payload Size:    {} bytes", envelope.len().saturating_sub(wire::MIN_ENVELOPE_BYTES));
    Ok(())
}
