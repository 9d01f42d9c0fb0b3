/// Strip scripting, dangerous attributes and disallowed elements from
/// an extracted HTML fragment. ammonia's default policy is a
/// conservative allow-list suited to third-party content, and cleaning
/// is idempotent.
pub fn sanitize(html: &str) -> String {
    ammonia::clean(html)
}
