//! Remote-item translator: logical nodes and edges to board wire payloads.
//!
//! Pure payload construction, no network. Board style keys are camelCase on
//! the wire (fillColor, borderWidth, textAlign, ...) while everything local
//! stays snake_case. Every flow-node payload embeds a key marker in its
//! content so identifier recovery has a fallback beyond response order.

use serde_json::{Value, json};

use crate::layout::Grid;
use crate::plan::{ChartPlan, Edge, Node, NodeKind};

const MARKER_PREFIX: &str = "<!--bwk:";
const MARKER_SUFFIX: &str = "-->";

/// Append the key marker to a label. HTML comments do not render on the
/// board, so the visible text is unchanged.
pub fn embed_key(label: &str, key: &str) -> String {
    format!("{label}{MARKER_PREFIX}{key}{MARKER_SUFFIX}")
}

/// Extract the embedded key from item content, if any.
pub fn parse_key(content: &str) -> Option<&str> {
    let start = content.find(MARKER_PREFIX)? + MARKER_PREFIX.len();
    let end = content[start..].find(MARKER_SUFFIX)? + start;
    Some(&content[start..end])
}

/// Content with the key marker removed; the visible label.
pub fn strip_key(content: &str) -> String {
    if let Some(start) = content.find(MARKER_PREFIX) {
        if let Some(rel) = content[start..].find(MARKER_SUFFIX) {
            let end = start + rel + MARKER_SUFFIX.len();
            let mut out = String::with_capacity(content.len());
            out.push_str(&content[..start]);
            out.push_str(&content[end..]);
            return out;
        }
    }
    content.to_string()
}

#[derive(Debug, Clone, Copy, Default)]
struct ShapeStyle<'a> {
    fill: Option<&'a str>,
    stroke: Option<&'a str>,
    stroke_width: Option<f64>,
    font_size: Option<i64>,
}

fn shape_payload(
    content: &str,
    x: i64,
    y: i64,
    width: i64,
    height: i64,
    shape: &str,
    style: ShapeStyle,
) -> Value {
    let mut style_map = serde_json::Map::new();
    if let Some(fill) = style.fill {
        style_map.insert("fillColor".to_string(), json!(fill));
        style_map.insert("fillOpacity".to_string(), json!(1.0));
    }
    if let Some(stroke) = style.stroke {
        style_map.insert("borderColor".to_string(), json!(stroke));
        style_map.insert(
            "borderWidth".to_string(),
            json!(style.stroke_width.unwrap_or(2.0)),
        );
        style_map.insert("borderOpacity".to_string(), json!(1.0));
        style_map.insert("borderStyle".to_string(), json!("normal"));
    }
    style_map.insert("textAlign".to_string(), json!("center"));
    style_map.insert("textAlignVertical".to_string(), json!("middle"));
    if let Some(size) = style.font_size {
        style_map.insert("fontSize".to_string(), json!(size));
    }

    json!({
        "type": "shape",
        "data": {"shape": shape, "content": content},
        "position": {"x": x, "y": y},
        "geometry": {"width": width, "height": height},
        "style": Value::Object(style_map),
    })
}

fn text_payload(content: &str, x: i64, y: i64, font_size: i64) -> Value {
    json!({
        "type": "text",
        "data": {"content": content},
        "position": {"x": x, "y": y},
        "style": {"fontSize": font_size},
    })
}

/// Background layer: outer white rectangle, lane dividers, column
/// gridlines, header separator.
pub fn background_items(grid: &Grid) -> Vec<Value> {
    let layout = grid.layout();
    let mut items = Vec::new();

    let width = grid.total_width();
    let height = grid.total_height();
    let top_left = grid.top_left();

    let frame_w = width + layout.frame_padding;
    let frame_cx = layout.origin_x + layout.frame_padding / 2;

    items.push(shape_payload(
        "",
        frame_cx,
        layout.origin_y,
        frame_w,
        height,
        "rectangle",
        ShapeStyle {
            fill: Some("#FFFFFF"),
            stroke: Some("#CFCFCF"),
            stroke_width: Some(3.0),
            ..ShapeStyle::default()
        },
    ));

    // Horizontal lane dividers
    for i in 1..grid.num_lanes() as i64 {
        let y = top_left.y + layout.header_height + i * layout.lane_height;
        items.push(shape_payload(
            "",
            frame_cx,
            y,
            frame_w,
            layout.divider_thickness,
            "rectangle",
            ShapeStyle {
                fill: Some("#E5E5E5"),
                ..ShapeStyle::default()
            },
        ));
    }

    // Vertical column gridlines
    for i in 1..grid.num_columns() as i64 {
        let x = top_left.x + layout.left_label_width + i * layout.col_width;
        items.push(shape_payload(
            "",
            x,
            layout.origin_y,
            layout.gridline_thickness,
            height,
            "rectangle",
            ShapeStyle {
                fill: Some("#E5E5E5"),
                ..ShapeStyle::default()
            },
        ));
    }

    // Header separator
    items.push(shape_payload(
        "",
        frame_cx,
        top_left.y + layout.header_height,
        frame_w,
        layout.divider_thickness,
        "rectangle",
        ShapeStyle {
            fill: Some("#E5E5E5"),
            ..ShapeStyle::default()
        },
    ));

    items
}

/// Text layer: title, subtitle, column labels in the header band, lane
/// labels in the left margin.
pub fn text_items(grid: &Grid, plan: &ChartPlan) -> Vec<Value> {
    let layout = grid.layout();
    let mut items = Vec::new();

    let width = grid.total_width();
    let top_left = grid.top_left();

    // Title and subtitle sit above the grid as borderless rectangles so
    // they get a fixed text box instead of auto-sizing.
    let title_x = top_left.x + width / 2;
    let title_y = top_left.y - 80;
    items.push(json!({
        "type": "shape",
        "data": {"shape": "rectangle", "content": plan.title},
        "position": {"x": title_x, "y": title_y},
        "geometry": {"width": 600, "height": 50},
        "style": {
            "fillOpacity": 0.0,
            "borderOpacity": 0.0,
            "fontSize": 28,
            "textAlign": "left",
            "fontFamily": "arial",
        },
    }));
    items.push(json!({
        "type": "shape",
        "data": {"shape": "rectangle", "content": plan.subtitle},
        "position": {"x": title_x, "y": title_y + 46},
        "geometry": {"width": 600, "height": 36},
        "style": {
            "fillOpacity": 0.0,
            "borderOpacity": 0.0,
            "fontSize": 16,
            "textAlign": "left",
            "fontFamily": "arial",
            "color": "#666666",
        },
    }));

    let header_y = top_left.y + layout.header_height / 2;
    for (i, column) in plan.columns.iter().enumerate() {
        items.push(text_payload(column, grid.col_center_x(i), header_y, 14));
    }

    let label_x = top_left.x + layout.left_label_width / 2;
    for (i, lane) in plan.lanes.iter().enumerate() {
        items.push(text_payload(lane, label_x, grid.lane_center_y(i), 16));
    }

    items
}

/// Node layer: payloads for flow nodes, with keys aligned 1:1 to payloads.
/// Text-ish kinds are skipped; the text layer already renders labels.
pub fn node_items(grid: &Grid, plan: &ChartPlan) -> (Vec<String>, Vec<Value>) {
    let layout = grid.layout();
    let mut keys = Vec::new();
    let mut items = Vec::new();

    for node in &plan.nodes {
        if !node.kind.is_flow() {
            continue;
        }
        let Some(lane_index) = plan.lane_index(&node.lane) else {
            continue;
        };
        let pos = grid.node_position(node, lane_index);
        let content = embed_key(&node.label, &node.key);
        let payload = match node.kind {
            NodeKind::Start => flow_shape(&content, pos.x, pos.y, node, 50, 50, "circle", "#BFE9D6", "#1a1a1a", 2.0),
            NodeKind::End => flow_shape(&content, pos.x, pos.y, node, 50, 50, "circle", "#DDDDDD", "#1a1a1a", 2.0),
            NodeKind::Decision => flow_shape(
                &content, pos.x, pos.y, node,
                layout.decision_w, layout.decision_h,
                "rhombus", "#FFF3CD", "#1a1a1a", 2.0,
            ),
            NodeKind::Chip => flow_shape(
                &content, pos.x, pos.y, node,
                layout.chip_w, layout.chip_h,
                "round_rectangle", "#D9ECFF", "#7AA7D9", 1.5,
            ),
            _ => flow_shape(
                &content, pos.x, pos.y, node,
                layout.task_w, layout.task_h,
                "rectangle", "#FFFFFF", "#1a1a1a", 2.0,
            ),
        };
        items.push(payload);
        keys.push(node.key.clone());
    }

    (keys, items)
}

#[allow(clippy::too_many_arguments)]
fn flow_shape(
    content: &str,
    x: i64,
    y: i64,
    node: &Node,
    default_w: i64,
    default_h: i64,
    shape: &str,
    default_fill: &str,
    default_stroke: &str,
    default_stroke_width: f64,
) -> Value {
    shape_payload(
        content,
        x,
        y,
        node.width.unwrap_or(default_w),
        node.height.unwrap_or(default_h),
        shape,
        ShapeStyle {
            fill: Some(node.fill.as_deref().unwrap_or(default_fill)),
            stroke: Some(node.stroke.as_deref().unwrap_or(default_stroke)),
            stroke_width: Some(node.stroke_width.unwrap_or(default_stroke_width)),
            font_size: None,
        },
    )
}

/// Connector wire payload between two already-created remote items.
pub fn connector_payload(edge: &Edge, start_id: &str, end_id: &str) -> Value {
    let mut style = serde_json::Map::new();
    style.insert(
        "strokeColor".to_string(),
        json!(edge.color.as_deref().unwrap_or("#1a1a1a")),
    );
    style.insert("strokeWidth".to_string(), json!(2.0));
    style.insert("endStrokeCap".to_string(), json!(edge.end_cap));
    if edge.dashed {
        style.insert("strokeStyle".to_string(), json!("dashed"));
    }

    let mut body = json!({
        "startItem": {"id": start_id, "snapTo": "auto"},
        "endItem": {"id": end_id, "snapTo": "auto"},
        "shape": edge.shape,
        "style": Value::Object(style),
    });
    if !edge.label.is_empty() {
        body["captions"] = json!([{"content": edge.label, "position": "50%"}]);
    }
    body
}

/// Copies of `items` parented to a frame. The inputs are left untouched so
/// a retry can re-derive payloads from the same built layers.
pub fn inject_parent(items: &[Value], frame_id: &str) -> Vec<Value> {
    items
        .iter()
        .map(|item| {
            let mut copy = item.clone();
            if let Value::Object(map) = &mut copy {
                map.insert("parent".to_string(), json!({"id": frame_id}));
            }
            copy
        })
        .collect()
}

/// Wire item type for ledger records ("shape", "text", ...).
pub fn item_type(item: &Value) -> String {
    item.get("type")
        .and_then(Value::as_str)
        .unwrap_or("shape")
        .to_string()
}
