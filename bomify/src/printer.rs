use std::collections::BTreeMap;
use std::io::Write;

use bomify_model::Element;

/// Field selection for query output.
pub struct PrinterOptions {
    pub purl: bool,
    pub fields: Vec<String>,
}

fn field_value(element: &Element, field: &str, purl: bool) -> String {
    match field {
        "name" => {
            if purl {
                element
                    .purl()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| element.display_name().to_string())
            } else {
                match element.version() {
                    Some(version) => format!("{}@{version}", element.display_name()),
                    None => element.display_name().to_string(),
                }
            }
        }
        "version" => element.version().unwrap_or_default().to_string(),
        "license" => element.license_concluded.clone().unwrap_or_default(),
        "supplier" => element
            .as_package()
            .and_then(|p| p.supplier.as_ref())
            .map(ToString::to_string)
            .unwrap_or_default(),
        "originator" => element
            .as_package()
            .and_then(|p| p.originator.as_ref())
            .map(ToString::to_string)
            .unwrap_or_default(),
        "url" => element
            .as_package()
            .map(|p| p.download_location.clone())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

pub fn print_lines(
    objects: &BTreeMap<String, Element>,
    opts: &PrinterOptions,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    for element in objects.values() {
        let values: Vec<String> = opts
            .fields
            .iter()
            .map(|f| field_value(element, f, opts.purl))
            .collect();
        writeln!(out, "{}", values.join(" "))?;
    }
    Ok(())
}

pub fn print_csv(
    objects: &BTreeMap<String, Element>,
    opts: &PrinterOptions,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    writeln!(out, "{}", opts.fields.join(","))?;
    for element in objects.values() {
        let values: Vec<String> = opts
            .fields
            .iter()
            .map(|f| {
                let value = field_value(element, f, opts.purl);
                if value.contains(',') || value.contains('"') {
                    format!("\"{}\"", value.replace('"', "\"\""))
                } else {
                    value
                }
            })
            .collect();
        writeln!(out, "{}", values.join(","))?;
    }
    Ok(())
}

pub fn print_json(
    objects: &BTreeMap<String, Element>,
    opts: &PrinterOptions,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let rows: Vec<BTreeMap<&str, String>> = objects
        .values()
        .map(|element| {
            opts.fields
                .iter()
                .map(|f| (f.as_str(), field_value(element, f, opts.purl)))
                .collect()
        })
        .collect();
    serde_json::to_writer_pretty(&mut *out, &rows)?;
    writeln!(out)?;
    Ok(())
}
