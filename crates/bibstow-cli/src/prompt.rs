use std::io::{BufRead, Write};

/// Blocking yes/no confirmation loop.
///
/// Accepts `y`/`yes` and `n`/`no` case-insensitively; anything else
/// re-prompts. There is no default and no timeout. EOF on the input counts
/// as a decline so a closed stdin can never approve a database mutation.
pub fn confirm<R: BufRead, W: Write>(
    question: &str,
    input: &mut R,
    out: &mut W,
) -> std::io::Result<bool> {
    loop {
        writeln!(out, "{question} (yes/no)")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }

        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {}
        }
    }
}
