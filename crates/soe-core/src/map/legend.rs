//! The draggable legend panel shared by the map tools.

/// Build the legend HTML: a fixed panel of colour swatches that the
/// reader can drag out of the way.
pub fn draggable_legend(title: &str, entries: &[(String, String)], opacity: f64) -> String {
    let mut items = String::new();
    for (label, colour) in entries {
        items.push_str(&format!(
            "    <div class=\"legend-item\"><span class=\"legend-color\" \
             style=\"background-color:{colour};opacity:{opacity:.2};\"></span>{label}</div>\n"
        ));
    }

    format!(
        r#"<style>
    #legend {{
        position: fixed;
        bottom: 75px;
        left: 25px;
        width: 200px;
        z-index: 9999;
        font-size: 12px;
        background-color: rgba(255, 255, 255, 0.7);
        padding: 10px;
        border-radius: 5px;
        box-shadow: 2px 2px 5px rgba(0, 0, 0, 0.3);
        cursor: move;
    }}
    #legend-title {{
        font-size: 12px;
        font-weight: bold;
        margin-bottom: 10px;
    }}
    .legend-item {{
        margin-bottom: 5px;
    }}
    .legend-color {{
        display: inline-block;
        width: 20px;
        height: 20px;
        margin-right: 10px;
    }}
</style>
<div id="legend">
<div id="legend-title">{title}</div>
{items}</div>
<script>
    const legend = document.getElementById('legend');
    let isDragging = false;
    let offsetX, offsetY;

    legend.addEventListener('mousedown', function(e) {{
        isDragging = true;
        offsetX = e.clientX - legend.offsetLeft;
        offsetY = e.clientY - legend.offsetTop;
        legend.style.cursor = 'grabbing';
    }});

    document.addEventListener('mousemove', function(e) {{
        if (isDragging) {{
            legend.style.left = (e.clientX - offsetX) + 'px';
            legend.style.top = (e.clientY - offsetY) + 'px';
        }}
    }});

    document.addEventListener('mouseup', function() {{
        isDragging = false;
        legend.style.cursor = 'move';
    }});
</script>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legend_lists_every_entry_with_its_colour() {
        let entries = vec![
            ("Green".to_string(), "#70ad47".to_string()),
            ("Red".to_string(), "#ff0000".to_string()),
        ];
        let html = draggable_legend("Grade", &entries, 0.5);
        assert!(html.contains("Grade"));
        assert!(html.contains("background-color:#70ad47"));
        assert!(html.contains("background-color:#ff0000"));
        assert_eq!(html.matches("legend-item").count(), 3); // css class + 2 items
    }
}
