use crate::normalize;

pub const MAX_ATTEMPTS: usize = 5;

#[derive(Debug)]
pub struct Resolved {
    pub value: String,
    /// Every attempt collided; the caller decides whether that is a hard
    /// error or a logged best-effort acceptance.
    pub exhausted: bool,
}

/// Settle on an identity number for a student. A candidate that is not
/// exactly 12 digits is replaced by a generated one. The probe reports which
/// student currently owns a number: unowned or owned by the same incoming id
/// is acceptance, owned by anyone else forces a regeneration. A failing
/// probe is diagnostic only and keeps the current candidate.
pub fn resolve_unique<F>(
    candidate: Option<&str>,
    student_id: i64,
    mut probe: F,
    attempts: usize,
) -> Resolved
where
    F: FnMut(&str) -> anyhow::Result<Option<i64>>,
{
    let mut value = match candidate {
        Some(c) if normalize::is_identity_number(c.trim()) => c.trim().to_string(),
        _ => normalize::generate_identity_number(),
    };

    for attempt in 0..attempts {
        match probe(&value) {
            Ok(None) => return Resolved { value, exhausted: false },
            Ok(Some(owner)) if owner == student_id => {
                return Resolved { value, exhausted: false }
            }
            Ok(Some(_)) => {
                if attempt + 1 < attempts {
                    value = normalize::generate_identity_number();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "identity probe failed, keeping current candidate");
                return Resolved { value, exhausted: false };
            }
        }
    }

    // Let the unique constraint arbitrate on write.
    Resolved {
        value,
        exhausted: true,
    }
}
