use super::EmailTemplate;

fn layout(heading: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; background: #f5f5f5; padding: 24px;">
  <div style="max-width: 600px; margin: 0 auto; background: #ffffff; border-radius: 8px; padding: 24px;">
    <h2 style="margin-top: 0;">{heading}</h2>
    {body}
    <p style="color: #888888; font-size: 12px;">This is an automated message, please do not reply.</p>
  </div>
</body>
</html>"#
    )
}

fn template(id: &str, subject: &str, heading: &str, body: &str, text: &str) -> EmailTemplate {
    EmailTemplate::new(id, subject, layout(heading, body), text)
}

pub(super) fn builtin() -> Vec<EmailTemplate> {
    vec![
        template(
            "employee_request_created",
            "New request from {{employeeName}} - {{requestType}}",
            "New employee request",
            "<p>{{employeeName}} submitted a <strong>{{requestType}}</strong> request on {{requestDate}}.</p>\
             <p>{{details}}</p><p><a href=\"{{actionUrl}}\">Review request</a></p>",
            "{{employeeName}} submitted a {{requestType}} request on {{requestDate}}.\n{{details}}\nReview: {{actionUrl}}",
        ),
        template(
            "employee_request_responded",
            "Your {{requestType}} request was {{status}}",
            "Request {{status}}",
            "<p>Hello {{employeeName}},</p><p>Your <strong>{{requestType}}</strong> request was {{status}}.</p>\
             <p>{{responseNote}}</p>",
            "Hello {{employeeName}},\nYour {{requestType}} request was {{status}}.\n{{responseNote}}",
        ),
        template(
            "product_order_pending",
            "New product order from {{employeeName}} - {{orderTotal}}",
            "Product order awaiting approval",
            "<p>{{employeeName}} placed order <strong>#{{orderId}}</strong> for {{orderTotal}}.</p>\
             <p>{{itemCount}} items. <a href=\"{{actionUrl}}\">Approve or reject</a></p>",
            "{{employeeName}} placed order #{{orderId}} for {{orderTotal}} ({{itemCount}} items).\nReview: {{actionUrl}}",
        ),
        template(
            "product_order_approved",
            "Order #{{orderId}} approved",
            "Order approved",
            "<p>Hello {{employeeName}},</p><p>Order <strong>#{{orderId}}</strong> ({{orderTotal}}) was approved.</p>",
            "Hello {{employeeName}},\nOrder #{{orderId}} ({{orderTotal}}) was approved.",
        ),
        template(
            "product_order_rejected",
            "Order #{{orderId}} rejected",
            "Order rejected",
            "<p>Hello {{employeeName}},</p><p>Order <strong>#{{orderId}}</strong> was rejected.</p>\
             <p>Reason: {{reason}}</p>",
            "Hello {{employeeName}},\nOrder #{{orderId}} was rejected.\nReason: {{reason}}",
        ),
        template(
            "product_order_completed",
            "Order #{{orderId}} completed",
            "Order completed",
            "<p>Hello {{employeeName}},</p><p>Order <strong>#{{orderId}}</strong> has been delivered.</p>",
            "Hello {{employeeName}},\nOrder #{{orderId}} has been delivered.",
        ),
        template(
            "payroll_generated",
            "Your payslip for {{month}} {{year}}",
            "Payslip {{month}} {{year}}",
            "<p>Hello {{employeeName}},</p>\
             <table><tr><td>Base salary</td><td>{{baseSalary}}</td></tr>\
             <tr><td>Bonus</td><td>{{bonus}}</td></tr>\
             <tr><td>Deductions</td><td>{{deductions}}</td></tr>\
             <tr><td><strong>Net salary</strong></td><td><strong>{{netSalary}}</strong></td></tr></table>\
             <p><a href=\"{{pdfUrl}}\">Download PDF</a></p>",
            "Hello {{employeeName}},\nBase salary: {{baseSalary}}\nBonus: {{bonus}}\nDeductions: {{deductions}}\n\
             Net salary: {{netSalary}}\nPDF: {{pdfUrl}}",
        ),
        template(
            "payroll_reminder",
            "Reminder: payroll for {{month}} is due",
            "Payroll reminder",
            "<p>Payroll for <strong>{{month}}</strong> has not been generated yet for {{branchName}}.</p>",
            "Payroll for {{month}} has not been generated yet for {{branchName}}.",
        ),
        template(
            "bonus_approved",
            "Your bonus for {{month}} - {{bonusAmount}}",
            "Bonus approved",
            "<p>Hello {{employeeName}},</p><p>A bonus of <strong>{{bonusAmount}}</strong> was approved for {{month}}.</p>",
            "Hello {{employeeName}},\nA bonus of {{bonusAmount}} was approved for {{month}}.",
        ),
        template(
            "bonus_reminder",
            "Reminder: calculate this week's bonuses",
            "Bonus reminder",
            "<p>Bonuses for week {{weekNumber}} at {{branchName}} have not been calculated yet.</p>",
            "Bonuses for week {{weekNumber}} at {{branchName}} have not been calculated yet.",
        ),
        template(
            "backup_completed",
            "Backup succeeded - {{backupDate}}",
            "Backup completed",
            "<p>The backup on {{backupDate}} finished: {{recordCount}} records, {{backupSize}}.</p>",
            "The backup on {{backupDate}} finished: {{recordCount}} records, {{backupSize}}.",
        ),
        template(
            "backup_failed",
            "Backup FAILED - {{backupDate}}",
            "Backup failed",
            "<p style=\"color: #c0392b;\">The backup on {{backupDate}} failed.</p><pre>{{errorMessage}}</pre>",
            "The backup on {{backupDate}} failed.\n{{errorMessage}}",
        ),
        template(
            "revenue_mismatch",
            "Revenue mismatch detected - {{date}}",
            "Revenue mismatch",
            "<p>{{branchName}} reported {{reportedTotal}} on {{date}}, calculated total is {{calculatedTotal}}.</p>\
             <p>Difference: <strong>{{difference}}</strong></p>",
            "{{branchName}} reported {{reportedTotal}} on {{date}}, calculated total is {{calculatedTotal}}.\n\
             Difference: {{difference}}",
        ),
        template(
            "large_expense",
            "Large expense recorded - {{amount}}",
            "Large expense",
            "<p>An expense of <strong>{{amount}}</strong> was recorded at {{branchName}} by {{createdBy}}.</p>\
             <p>{{description}}</p>",
            "An expense of {{amount}} was recorded at {{branchName}} by {{createdBy}}.\n{{description}}",
        ),
    ]
}
