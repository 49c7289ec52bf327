//! Numeric token parsing for free-text page fragments such as `"$49.99"` or
//! `"1,653 ratings"`.

/// Takes all numbers from a string, in order.
///
/// Digits and `.` build up a candidate token, `,` is skipped without ending the
/// token, and anything else terminates it. Candidates that do not parse as a
/// float (a lone `.`, two decimal points) are dropped.
///
/// Any Unicode numeric character counts as a digit while scanning, but only
/// ASCII digits parse, so a run containing e.g. Arabic-Indic digits or `½` is
/// dropped whole rather than split around them.
pub fn numbers_from_str(input: &str) -> Vec<f64> {
    let mut numbers = Vec::new();
    let mut candidate = String::new();

    for c in input.chars() {
        match c {
            ',' => {}
            '.' => candidate.push(c),
            c if c.is_numeric() => candidate.push(c),
            _ => flush(&mut candidate, &mut numbers),
        }
    }
    flush(&mut candidate, &mut numbers);

    numbers
}

/// Same as [`numbers_from_str`] with `default` appended, so the first element
/// always exists.
pub fn numbers_or(input: &str, default: f64) -> Vec<f64> {
    let mut numbers = numbers_from_str(input);
    numbers.push(default);
    numbers
}

/// First number in `input`, or `default` when there is none.
pub fn first_number_or(input: &str, default: f64) -> f64 {
    numbers_or(input, default)[0]
}

fn flush(candidate: &mut String, numbers: &mut Vec<f64>) {
    if candidate.is_empty() {
        return;
    }
    if let Ok(number) = candidate.parse::<f64>() {
        numbers.push(number);
    }
    candidate.clear();
}
