//! Headless `inspect` run: feed files from disk through the session and
//! print each readable entry's decoded structure.

use std::fmt::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use crate::actor::SessionHandle;
use crate::collaborator::{HttpBackend, ParseBackend};
use crate::config::InspectArgs;
use crate::intake::{EntryStatus, FileSource};
use crate::session::Snapshot;
use crate::tree;
use crate::validate::{CertificateBundle, ChainRole, DistinguishedName};

pub async fn inspect(args: InspectArgs) -> Result<()> {
    let backend: Arc<dyn ParseBackend> = Arc::new(HttpBackend::new(args.backend.url.clone()));
    let session = SessionHandle::spawn(backend);
    let report = run(&session, &args).await?;
    print!("{report}");
    Ok(())
}

/// Runs the pipeline over `args.files` and returns the text report.
pub async fn run(session: &SessionHandle, args: &InspectArgs) -> Result<String> {
    let sources = args.files.iter().cloned().map(FileSource::Path).collect();
    let ids = session.submit(sources).await?;
    let snapshot = session.settled().await?;

    let mut out = String::new();
    for id in &ids {
        let Some(entry) = snapshot.entry(id) else {
            continue;
        };
        writeln!(out, "== {} ({})", entry.name, entry.extension)?;
        if entry.status == EntryStatus::Errored {
            let reason = entry.error.as_deref().unwrap_or("unreadable");
            warn!(filename = %entry.name, "Skipping unreadable file");
            writeln!(out, "   error: {reason}")?;
            continue;
        }

        session
            .select(id)
            .await
            .with_context(|| format!("selecting {}", entry.name))?;
        let mut current = session.settled().await?;

        if current.prompt_open {
            match &args.password {
                Some(password) => {
                    session.submit_password(password).await?;
                    current = session.settled().await?;
                }
                None => {
                    session.skip_password().await?;
                    writeln!(out, "   encrypted; pass --password to decode")?;
                    continue;
                }
            }
        }

        let Some(bundle) = current.bundle.clone() else {
            writeln!(out, "   failed: {}", failure_reason(&current))?;
            continue;
        };

        if args.json {
            writeln!(out, "{}", serde_json::to_string_pretty(bundle.as_value())?)?;
            continue;
        }

        summary(&mut out, &bundle)?;
        for path in &args.collapse {
            session.collapse(path).await?;
        }
        out.push_str(&tree::render_text(session.tree().await?));
    }
    Ok(out)
}

fn failure_reason(snapshot: &Snapshot) -> String {
    snapshot
        .password
        .error()
        .map(str::to_owned)
        .or_else(|| snapshot.notices.last().map(|n| n.message.clone()))
        .unwrap_or_else(|| "no certificate data".to_string())
}

/// Per certificate: a headline with position, names and validity, then
/// the subject DN, serial and fingerprint, and any alternative names.
pub fn summary(out: &mut impl Write, bundle: &CertificateBundle) -> fmt::Result {
    for cert in bundle.certificates() {
        let role = match cert.role {
            ChainRole::Leaf => "leaf",
            ChainRole::Intermediate => "intermediate",
            ChainRole::Root => "root",
        };
        let subject = cert.subject();
        let issuer = cert.issuer();
        writeln!(
            out,
            "   #{} {role}{}: {} <- {} [{} .. {}]",
            cert.index,
            if cert.is_ca() { " (CA)" } else { "" },
            subject.common_name().unwrap_or("<no CN>"),
            issuer.common_name().unwrap_or("<no CN>"),
            cert.not_before(),
            cert.not_after(),
        )?;
        writeln!(out, "      subject: {}", distinguished(&subject))?;
        writeln!(
            out,
            "      serial {}, {}, sha256 {}",
            cert.serial_number(),
            cert.signature_algorithm(),
            cert.fingerprint_sha256(),
        )?;

        let sans = cert.subject_alt_names();
        for (label, names) in [
            ("dns", sans.dns_names()),
            ("ip", sans.ip_addresses()),
            ("email", sans.email_addresses()),
            ("uri", sans.uris()),
        ] {
            if !names.is_empty() {
                writeln!(out, "      {label}: {}", names.join(", "))?;
            }
        }
    }
    Ok(())
}

/// `CN=.., O=.., OU=.., L=.., ST=.., C=..`, skipping absent parts.
fn distinguished(name: &DistinguishedName<'_>) -> String {
    let mut parts: Vec<String> = name
        .common_name()
        .map(|cn| format!("CN={cn}"))
        .into_iter()
        .collect();
    for (key, values) in [
        ("O", name.organization()),
        ("OU", name.organizational_unit()),
        ("L", name.locality()),
        ("ST", name.province()),
        ("C", name.country()),
    ] {
        parts.extend(values.into_iter().map(|value| format!("{key}={value}")));
    }
    if parts.is_empty() {
        "<empty>".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::tests::{envelope, record};
    use crate::validate::validate;

    use serde_json::json;

    fn render(bundle: &CertificateBundle) -> String {
        let mut text = String::new();
        summary(&mut text, bundle).unwrap();
        text
    }

    #[test]
    fn summary_lists_chain_roles() {
        let mut root = record("Example Root");
        root["isCA"] = json!(true);
        let bundle = validate(envelope(vec![record("leaf.example.com"), root])).unwrap();
        let text = render(&bundle);
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].contains("#0 leaf: leaf.example.com <- Example CA"));
        assert_eq!(lines[1], "      subject: CN=leaf.example.com, O=Example Org");
        assert_eq!(lines[2], "      serial 1234, SHA256-RSA, sha256 11");
        assert_eq!(lines[3], "      dns: example.com, www.example.com");
        assert!(lines[4].contains("#1 root (CA): Example Root"));
    }

    #[test]
    fn summary_shows_full_subject_and_every_alt_name_kind() {
        let mut leaf = record("mail.example.com");
        leaf["subject"] = json!({
            "commonName": "mail.example.com",
            "organization": ["Example Org"],
            "organizationalUnit": ["Ops"],
            "locality": ["Berlin"],
            "province": ["BE"],
            "country": ["DE"]
        });
        leaf["subjectAlternativeNames"] = json!({
            "dnsNames": null,
            "ipAddresses": ["10.0.0.1"],
            "emailAddresses": ["ops@example.com"],
            "uris": ["spiffe://example.com/mail"]
        });
        let text = render(&validate(envelope(vec![leaf])).unwrap());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[1],
            "      subject: CN=mail.example.com, O=Example Org, OU=Ops, L=Berlin, ST=BE, C=DE"
        );
        assert_eq!(lines[3], "      ip: 10.0.0.1");
        assert_eq!(lines[4], "      email: ops@example.com");
        assert_eq!(lines[5], "      uri: spiffe://example.com/mail");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn empty_subject_is_marked() {
        let mut leaf = record("x");
        leaf["subject"] = json!({ "commonName": "" });
        let text = render(&validate(envelope(vec![leaf])).unwrap());
        assert!(text.contains("      subject: <empty>\n"));
    }
}
