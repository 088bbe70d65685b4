//! Text formatting shared with the server-side renderer.
//!
//! Every function here has a twin on the server and the two must agree byte for byte: rendered
//! fragments from either side are cached and swapped interchangeably. Rounding, padding and
//! pluralization are therefore pinned exactly; `tests/fixtures/golden.yaml` holds the shared
//! expectations.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};

use crate::lang::Lang;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Divisors walked by [`relative_time`], paired with the unit reached before dividing.
const LADDER: [(i64, &str); 4] = [(60, "minute"), (24, "hour"), (30, "day"), (12, "month")];

/// Minutes in the future still treated as "just now" to absorb client clock skew.
const SKEW_MINUTES: i64 = 5;

/// Left-pads a number below ten with a single zero. Larger numbers are left untouched.
pub fn pad(n: u64) -> String {
    if n < 10 {
        format!("0{n}")
    } else {
        n.to_string()
    }
}

/// Renders an absolute timestamp in the viewer's local time zone:
/// `DD <month> YYYY (<weekday>) HH:MM`.
pub fn readable_time(lang: &Lang, time: i64) -> String {
    readable_time_in(lang, time, &Local)
}

/// [`readable_time`] for an explicit time zone.
pub fn readable_time_in<Tz: TimeZone>(lang: &Lang, time: i64, tz: &Tz) -> String {
    let d = DateTime::<Utc>::from_timestamp(time, 0)
        .unwrap_or_default()
        .with_timezone(tz);
    format!(
        "{} {} {} ({}) {}:{}",
        pad(d.day().into()),
        lang.month(d.month0()),
        d.year(),
        lang.day(d.weekday().num_days_from_sunday()),
        pad(d.hour().into()),
        pad(d.minute().into()),
    )
}

/// Renders the time elapsed since `then` relative to the current clock.
pub fn relative_time(lang: &Lang, then: i64) -> String {
    relative_time_at(lang, then, Utc::now().timestamp())
}

/// Renders "5 minutes ago" or "in 5 minutes" style text for `then`, seen from `now`.
/// Both are Unix timestamps in seconds.
pub fn relative_time_at(lang: &Lang, then: i64, now: i64) -> String {
    let mut time = (now - then).div_euclid(60);
    let mut is_future = false;
    if time < 1 {
        if time > -SKEW_MINUTES {
            return lang.tr("justNow").to_string();
        }
        is_future = true;
        time = -time;
    }

    for (divisor, unit) in LADDER {
        if time < divisor {
            return ago(lang, unit, time, is_future);
        }
        time /= divisor;
    }

    ago(lang, "year", time, is_future)
}

fn ago(lang: &Lang, unit: &str, time: i64, is_future: bool) -> String {
    let n = time.unsigned_abs();
    let count = format!("{} {}", n, lang.ngettext(unit, n));
    if is_future {
        format!("{} {}", lang.tr("in"), count)
    } else {
        format!("{} {}", count, lang.tr("ago"))
    }
}

/// Renders a media length in seconds as `MM:SS`.
pub fn duration(seconds: u64) -> String {
    format!("{}:{}", pad(seconds / 60), pad(seconds % 60))
}

/// Renders a byte count as `<n>b`, `<n.nn>kb` or `<n.nn>mb`.
///
/// Fractions round half up on the exact quotient, which is what the server's fixed-point
/// formatting does for these inputs.
pub fn file_size(lang: &Lang, size: u64) -> String {
    if size < KIB {
        format!("{}{}", size, lang.tr("b"))
    } else if size < MIB {
        format!("{}{}", hundredths(size, KIB), lang.tr("kb"))
    } else {
        format!("{}{}", hundredths(size, MIB), lang.tr("mb"))
    }
}

fn hundredths(value: u64, unit: u64) -> String {
    let scaled = (u128::from(value) * 100 + u128::from(unit) / 2) / u128::from(unit);
    format!("{}.{:02}", scaled / 100, scaled % 100)
}

/// Link target of a quote link to post `id`.
///
/// Cross-thread links and links on index pages go through the `/all/` redirect; everything
/// else is a fragment on the current page.
pub fn post_link_url(id: u64, cross: bool, index: bool) -> String {
    if cross || index {
        format!("/all/{id}#{id}")
    } else {
        format!("#{id}")
    }
}
