use anyhow::{Result, anyhow};

/// Longest fully qualified name ACM accepts for a certificate subject.
const MAX_NAME_LEN: usize = 253;

/// Checks that `input` can be requested as a certificate name.
///
/// A single leading wildcard label is allowed. Internationalised names are
/// checked in their ASCII (punycode) form; the caller's spelling is what
/// gets sent and compared.
pub fn check_certificate_name(input: &str) -> Result<()> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(anyhow!("domain name is required"));
    }
    let (wildcard, host) = match trimmed.strip_prefix("*.") {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if host.contains('*') {
        return Err(anyhow!("invalid wildcard in domain name: {input}"));
    }
    let ascii = idna::domain_to_ascii(host)
        .map_err(|err| anyhow!("invalid domain name {input}: {err}"))?;
    if !ascii.contains('.') {
        return Err(anyhow!("domain name must have at least two labels: {input}"));
    }
    let len = if wildcard { ascii.len() + 2 } else { ascii.len() };
    if len > MAX_NAME_LEN {
        return Err(anyhow!("domain name is too long: {input}"));
    }
    Ok(())
}
