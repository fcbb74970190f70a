/// Up to three items are listed in full; beyond that the first two are kept
/// and the rest summarized as `et N autre(s)`.
pub fn list_with_overflow<S: AsRef<str>>(items: &[S]) -> String {
    let names: Vec<&str> = items.iter().map(AsRef::as_ref).collect();
    if names.len() <= 3 {
        return names.join(", ");
    }
    format!("{} et {} autre(s)", names[..2].join(", "), names.len() - 2)
}
