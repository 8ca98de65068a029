pub fn normalize_newlines(value: &str) -> String {
    value.replace("\r\n", "\n")
}

pub fn line_diff(expected: &str, received: &str) -> String {
    let expected_norm = normalize_newlines(expected);
    let received_norm = normalize_newlines(received);
    let exp: Vec<&str> = expected_norm.trim_end().split('\n').collect();
    let rec: Vec<&str> = received_norm.trim_end().split('\n').collect();
    let max_lines = exp.len().max(rec.len());

    for i in 0..max_lines {
        let e = exp.get(i).copied().unwrap_or("<sin línea>");
        let r = rec.get(i).copied().unwrap_or("<sin línea>");
        if e.trim_end() != r.trim_end() {
            return format!("Línea {}\n- esperado: {:?}\n+ recibido: {:?}", i + 1, e, r);
        }
    }

    "Diferencia no localizada (posible carácter invisible).".into()
}

/// Identificador estilo Python: letras, dígitos y `_`, sin empezar por dígito.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Literal de cadena Python de una sola línea entre comillas dobles.
///
/// Se escapan barra invertida, comillas y todo carácter de control, de modo que
/// el contenido nunca puede cerrar el literal antes de tiempo.
pub fn python_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            '\u{2028}' | '\u{2029}' | '\u{85}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
