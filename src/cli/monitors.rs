use anyhow::Result;

use memri::capture;

/// Print the monitors the capture backend can see.
pub async fn monitors() -> Result<()> {
    let source = capture::default_source();
    let monitors = capture::list_monitors(source.as_ref()).await?;

    if monitors.is_empty() {
        println!("No monitors detected (capture backend: {}).", source.name());
        return Ok(());
    }

    println!("{:<6} {:<28} {:>11}  Primary", "ID", "Name", "Resolution");
    for m in &monitors {
        println!(
            "{:<6} {:<28} {:>11}  {}",
            m.id,
            m.name,
            format!("{}x{}", m.width, m.height),
            if m.is_primary { "yes" } else { "" }
        );
    }
    Ok(())
}
