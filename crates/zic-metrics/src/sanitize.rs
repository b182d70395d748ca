//! Item key → metric name rewriting.

/// Literal substitutions, applied in order. Later ones see the output of
/// earlier ones.
const SUBSTITUTIONS: [(&str, &str); 5] = [
    ("[", "__"),
    (",", ":"),
    ("]", "__"),
    (" ", "_"),
    ("-", "_"),
];

/// Rewrite a Zabbix item key into a Prometheus metric name.
///
/// `zabbix[wcache,values,float]` becomes `zabbix__wcache:values:float__`.
/// Characters outside the substitution set (`{`, `$`, ...) pass through.
pub fn sanitize_metric_name(key: &str) -> String {
    SUBSTITUTIONS
        .iter()
        .fold(key.to_string(), |name, (from, to)| name.replace(from, to))
}
