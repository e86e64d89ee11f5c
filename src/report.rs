// Report renderer: pure functions from samples + status updates to the monitor page.
// Charts are Plotly figures embedded as JSON and drawn client-side.

use chrono::{Local, TimeZone};
use serde_json::{Value, json};

use crate::datastore::{SampleStore, StatusFeed};
use crate::error::StoreResult;
use crate::models::{EntityKind, Sample, StatusUpdate};

const PLOT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const UPDATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything a render needs, read from the stores at one point in time.
#[derive(Debug, Clone, Default)]
pub struct ReportInputs {
    pub all: Vec<Sample>,
    pub recent: Vec<Sample>,
    pub updates: Vec<StatusUpdate>,
}

impl ReportInputs {
    pub async fn load(
        samples: &dyn SampleStore,
        feed: &dyn StatusFeed,
        recent_limit: usize,
    ) -> StoreResult<Self> {
        let (all, recent, updates) =
            tokio::try_join!(samples.all(), samples.recent(recent_limit), feed.all())?;
        Ok(Self {
            all,
            recent,
            updates,
        })
    }

    pub fn render(&self) -> String {
        render(&self.all, &self.recent, &self.updates)
    }

    pub fn plots(&self) -> Value {
        plots(&self.all, &self.recent, &self.updates)
    }
}

/// Full HTML page: four charts plus the status update list.
pub fn render(all: &[Sample], recent: &[Sample], updates: &[StatusUpdate]) -> String {
    let figures = plots(all, recent, updates);
    // `</` inside an inline script would close the tag early.
    let figures_json = figures.to_string().replace("</", "<\\/");
    HTML_TEMPLATE
        .replace("{{plots_json}}", &figures_json)
        .replace("{{updates_html}}", &updates_html(updates))
}

/// Chart figures and rendered updates, as served to the page's live refresh.
pub fn plots(all: &[Sample], recent: &[Sample], updates: &[StatusUpdate]) -> Value {
    let (recent_counts, recent_rates) = figures(recent, "(Recent)");
    let (all_counts, all_rates) = figures(all, "(Complete)");
    json!({
        "recent_counts": recent_counts,
        "recent_rates": recent_rates,
        "all_counts": all_counts,
        "all_rates": all_rates,
        "updates_html": updates_html(updates),
    })
}

fn figures(samples: &[Sample], suffix: &str) -> (Value, Value) {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        let empty = || json!({ "data": [], "layout": { "title": { "text": format!("No data yet {}", suffix) } } });
        return (empty(), empty());
    };
    let x: Vec<String> = samples
        .iter()
        .map(|s| format_millis(s.timestamp, PLOT_TIME_FORMAT))
        .collect();
    let range = [
        format_millis(first.timestamp, PLOT_TIME_FORMAT),
        format_millis(last.timestamp, PLOT_TIME_FORMAT),
    ];

    let count_traces: Vec<Value> = EntityKind::ALL
        .iter()
        .map(|&kind| line_trace(kind.as_str(), &x, samples.iter().map(|s| s.count(kind) as f64)))
        .collect();
    let rate_traces: Vec<Value> = EntityKind::RATE_TRACKED
        .iter()
        .map(|&kind| line_trace(kind.rate_column(), &x, samples.iter().map(|s| s.rate(kind))))
        .collect();

    (
        json!({
            "data": count_traces,
            "layout": layout(&format!("Collection Counts Over Time {}", suffix), "Count", &range),
        }),
        json!({
            "data": rate_traces,
            "layout": layout(&format!("Processing Rates Over Time {}", suffix), "Items/second", &range),
        }),
    )
}

fn line_trace(name: &str, x: &[String], y: impl Iterator<Item = f64>) -> Value {
    json!({
        "type": "scatter",
        "mode": "lines",
        "name": name,
        "x": x,
        "y": y.collect::<Vec<f64>>(),
    })
}

fn layout(title: &str, y_title: &str, range: &[String; 2]) -> Value {
    json!({
        "title": { "text": title },
        "xaxis": { "title": { "text": "Time" }, "range": range },
        "yaxis": { "title": { "text": y_title } },
        "hovermode": "x unified",
        "legend": {
            "orientation": "h",
            "yanchor": "bottom",
            "y": 1.02,
            "xanchor": "right",
            "x": 1,
        },
    })
}

/// `<li>` per update, in feed order (newest first).
pub fn updates_html(updates: &[StatusUpdate]) -> String {
    updates
        .iter()
        .map(|u| {
            format!(
                "<li class=\"update-item\">{}: {}</li>",
                format_millis(u.timestamp, UPDATE_TIME_FORMAT),
                escape_html(&u.message)
            )
        })
        .collect()
}

fn format_millis(ms: i64, fmt: &str) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(t) => t.format(fmt).to_string(),
        None => ms.to_string(),
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Clone Detector Monitor</title>
    <script src="https://cdn.plot.ly/plotly-latest.min.js"></script>
    <style>
        .plot-container {
            margin: 20px 0;
            background-color: white;
            padding: 15px;
            border-radius: 4px;
            width: 100%;
        }
        .js-plotly-plot, .plotly {
            width: 100% !important;
        }
    </style>
    <script>
        const INITIAL_PLOTS = {{plots_json}};
        const PLOT_IDS = {
            'recent-counts': 'recent_counts',
            'recent-rates': 'recent_rates',
            'all-counts': 'all_counts',
            'all-rates': 'all_rates'
        };
        let updateTimer;

        function drawPlots(data, draw) {
            for (const [elementId, key] of Object.entries(PLOT_IDS)) {
                if (document.getElementById(elementId) && data[key]) {
                    draw(elementId, data[key].data, data[key].layout);
                }
            }
        }

        function updatePlots() {
            fetch('/get_plots')
                .then(response => response.json())
                .then(data => {
                    if (data.error) {
                        console.error('Error fetching plots:', data.error);
                        return;
                    }
                    document.getElementById('status-updates').innerHTML = data.updates_html;
                    drawPlots(data, Plotly.react);
                })
                .catch(error => console.error('Error:', error));
        }

        function startAutoUpdate() {
            updateTimer = setInterval(updatePlots, 5000);
        }

        function stopAutoUpdate() {
            clearInterval(updateTimer);
        }

        window.onload = function() {
            drawPlots(INITIAL_PLOTS, Plotly.newPlot);
            startAutoUpdate();
            document.addEventListener('visibilitychange', function() {
                if (document.hidden) {
                    stopAutoUpdate();
                } else {
                    updatePlots();
                    startAutoUpdate();
                }
            });
        };

        window.addEventListener('resize', function() {
            const plots = document.getElementsByClassName('js-plotly-plot');
            for (let i = 0; i < plots.length; i++) {
                Plotly.Plots.resize(plots[i]);
            }
        });
    </script>
</head>
<body>
    <div class="container">
        <h1>Clone Detector Monitor</h1>

        <div class="plot-view recent">
            <div class="plot-container"><div id="recent-counts"></div></div>
            <div class="plot-container"><div id="recent-rates"></div></div>
        </div>

        <div class="plot-view complete">
            <div class="plot-container"><div id="all-counts"></div></div>
            <div class="plot-container"><div id="all-rates"></div></div>
        </div>

        <div class="updates">
            <h2>Recent Status Updates</h2>
            <ul id="status-updates" style="list-style-type: none; padding: 0;">
                {{updates_html}}
            </ul>
        </div>
    </div>
</body>
</html>
"#;
